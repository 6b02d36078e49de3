//! Asynchronous-resource provider categories and mask algebra.
//!
//! Every asynchronous operation is owned by a resource of exactly one
//! provider category. Each category is encoded as a single set bit within a
//! 32-bit word so that listener filtering is a single AND. The [`Provider::Tick`]
//! sentinel is all-bits-set: a user-space tick cannot name its originating
//! category, so it must intersect every non-empty watch mask.

use core::fmt;
use core::ops::{BitOr, BitOrAssign};
use serde::{Deserialize, Serialize};

/// The category of asynchronous resource that owns a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    /// No provider; the global context carries this value.
    None,
    /// Cryptographic operations (random bytes, key derivation).
    Crypto,
    /// Filesystem event watchers.
    FsEvent,
    /// Filesystem requests.
    Fs,
    /// Address resolution requests.
    GetAddrInfo,
    /// Pipe handles.
    Pipe,
    /// Child process handles.
    Process,
    /// Generic queries (DNS and friends).
    Query,
    /// Socket shutdown requests.
    Shutdown,
    /// Signal watchers.
    Signal,
    /// Stat watchers.
    StatWatcher,
    /// TCP sockets.
    Tcp,
    /// Timer handles.
    Timer,
    /// TLS sessions.
    Tls,
    /// TTY handles.
    Tty,
    /// UDP sockets.
    Udp,
    /// Compression streams.
    Zlib,
    /// User-space tick scheduling; the originating category cannot be
    /// determined, so this value matches every watch mask.
    Tick,
}

/// All providers, in bit order. `None` first, `Tick` last.
pub const ALL_PROVIDERS: [Provider; 18] = [
    Provider::None,
    Provider::Crypto,
    Provider::FsEvent,
    Provider::Fs,
    Provider::GetAddrInfo,
    Provider::Pipe,
    Provider::Process,
    Provider::Query,
    Provider::Shutdown,
    Provider::Signal,
    Provider::StatWatcher,
    Provider::Tcp,
    Provider::Timer,
    Provider::Tls,
    Provider::Tty,
    Provider::Udp,
    Provider::Zlib,
    Provider::Tick,
];

impl Provider {
    /// Returns the provider's bit encoding.
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Crypto => 1 << 0,
            Self::FsEvent => 1 << 1,
            Self::Fs => 1 << 2,
            Self::GetAddrInfo => 1 << 3,
            Self::Pipe => 1 << 4,
            Self::Process => 1 << 5,
            Self::Query => 1 << 6,
            Self::Shutdown => 1 << 7,
            Self::Signal => 1 << 8,
            Self::StatWatcher => 1 << 9,
            Self::Tcp => 1 << 10,
            Self::Timer => 1 << 11,
            Self::Tls => 1 << 12,
            Self::Tty => 1 << 13,
            Self::Udp => 1 << 14,
            Self::Zlib => 1 << 15,
            Self::Tick => 0xFFFF_FFFF,
        }
    }

    /// Returns the provider name surfaced to `create` callbacks.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Crypto => "CRYPTO",
            Self::FsEvent => "FSEVENT",
            Self::Fs => "FS",
            Self::GetAddrInfo => "GETADDRINFO",
            Self::Pipe => "PIPE",
            Self::Process => "PROCESS",
            Self::Query => "QUERY",
            Self::Shutdown => "SHUTDOWN",
            Self::Signal => "SIGNAL",
            Self::StatWatcher => "STATWATCHER",
            Self::Tcp => "TCP",
            Self::Timer => "TIMER",
            Self::Tls => "TLS",
            Self::Tty => "TTY",
            Self::Udp => "UDP",
            Self::Zlib => "ZLIB",
            Self::Tick => "TICK",
        }
    }

    /// Looks a provider up by its exact bit encoding.
    #[must_use]
    pub fn from_bits(bits: u32) -> Option<Self> {
        ALL_PROVIDERS.iter().copied().find(|p| p.bits() == bits)
    }

    /// Looks a provider up by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        ALL_PROVIDERS.iter().copied().find(|p| p.name() == name)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A 32-bit OR of provider bits.
///
/// A listener's callbacks fire for a context only if the context's provider
/// bit intersects the listener's watch mask; the error callback is exempt
/// from this filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ProviderMask(u32);

impl ProviderMask {
    /// The empty mask.
    pub const EMPTY: Self = Self(0);

    /// The default watch mask for new listeners: the low 28 bits.
    pub const DEFAULT_WATCH: Self = Self(0x0FFF_FFFF);

    /// Creates a mask from raw bits.
    #[must_use]
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if no bits are set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if the provider's bit intersects this mask.
    #[must_use]
    pub const fn contains(self, provider: Provider) -> bool {
        self.0 & provider.bits() != 0
    }

    /// Returns true if the two masks share any bit.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns the union of the two masks.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for ProviderMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for ProviderMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl From<Provider> for ProviderMask {
    fn from(provider: Provider) -> Self {
        Self(provider.bits())
    }
}

impl fmt::Display for ProviderMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
