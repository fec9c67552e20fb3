use bitflags::bitflags;

bitflags! {
    /// Independently toggleable metrics. Flag names double as the option
    /// keys accepted by the configuration string (lowercased).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FeatureSet: u16 {
        const SYSLOAD  = 1 << 0;
        const FREEMEM  = 1 << 1;
        const CPU      = 1 << 2;
        const RSS      = 1 << 3;
        const HEAP     = 1 << 4;
        const EVLOOP   = 1 << 5;
        const NUMCONN  = 1 << 6;
        const RPS      = 1 << 7;
        const RESTIME  = 1 << 8;
        const REQBYTES = 1 << 9;
        const RESBYTES = 1 << 10;
        const RXRATE   = 1 << 11;
        const TXRATE   = 1 << 12;
    }
}

impl FeatureSet {
    /// Metrics derived from the request listener's per-period counters.
    pub const REQUEST_DERIVED: Self = Self::RPS
        .union(Self::RESTIME)
        .union(Self::REQBYTES)
        .union(Self::RESBYTES)
        .union(Self::RXRATE)
        .union(Self::TXRATE);

    /// Everything that cannot be measured without an attached server.
    pub const SERVER_DEPENDENT: Self = Self::REQUEST_DERIVED.union(Self::NUMCONN);

    /// Look up a single feature by its option key (`"cpu"`, `"rxrate"`, ...).
    pub fn lookup(key: &str) -> Option<Self> {
        Self::from_name(&key.to_ascii_uppercase())
    }

    /// Drop server-dependent metrics when there is no server to feed them.
    pub fn effective(self, has_server: bool) -> Self {
        if has_server {
            self
        } else {
            self.difference(Self::SERVER_DEPENDENT)
        }
    }
}
