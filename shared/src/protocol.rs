/// Well-known bus name of the Avahi daemon
pub const AVAHI_SERVICE: &str = "org.freedesktop.Avahi";

/// Object path of the Avahi server object
pub const AVAHI_SERVER_PATH: &str = "/";

/// Avahi interface/protocol index meaning "all"
pub const AVAHI_IF_UNSPEC: i32 = -1;
pub const AVAHI_PROTO_UNSPEC: i32 = -1;

/// Resource record parameters for published aliases
pub const RECORD_CLASS_IN: u16 = 0x01;
pub const RECORD_TYPE_CNAME: u16 = 0x05;
pub const RECORD_TTL_SECS: u32 = 60;

/// Hostnames must carry this suffix to be published over mDNS
pub const LOCAL_SUFFIX: &str = ".local";

/// API path prefix
pub const API_PREFIX: &str = "/v1";
