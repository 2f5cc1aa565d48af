// Centralized constants for stagecast to avoid magic numbers

/// Default interval between UDP collector re-resolutions (5 minutes)
pub const DEFAULT_CLIENT_TTL_SECS: u64 = 300;

/// Default StatsD packet size, safe for typical Ethernet MTUs
pub const DEFAULT_STATSD_MAX_PACKET_BYTES: usize = 1432;

/// Default StatsD collector port
pub const DEFAULT_STATSD_PORT: u16 = 8125;

/// Root of every UDP bucket path
pub const DEFAULT_STATSD_PREFIX: &str = "pipeline";

/// Connect timeout for outbound HTTP notifications
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Read timeout for outbound HTTP notifications
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 10;

/// Public GitHub REST endpoint
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Value of the `Referer` header identifying where JSON notifications come from
pub const DEFAULT_REFERER: &str = "stagecast";

/// `User-Agent` sent to every HTTP backend
pub const USER_AGENT: &str = concat!("stagecast/", env!("CARGO_PKG_VERSION"));

/// Environment key carrying a stage duration in milliseconds
pub const ENV_DURATION_KEY: &str = "duration";

/// Maximum number of response body bytes kept when reporting a failed request
pub const MAX_ERROR_BODY_LEN: usize = 512;
