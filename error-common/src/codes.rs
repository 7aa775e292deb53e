// Error codes implementation
// Stable codes written into audit metadata and CLI output

pub mod validation {
    pub const MISSING_REQUIRED_FIELD: &str = "VALIDATION_1001";
    pub const NOT_FOUND: &str = "VALIDATION_1002";
    pub const INVALID_TRANSITION: &str = "VALIDATION_1003";
}

pub mod integration {
    pub const CHANNEL_FAILED: &str = "INTEGRATION_2001";
    pub const ADAPTER_MISSING: &str = "INTEGRATION_2002";
    pub const TIMEOUT: &str = "INTEGRATION_2003";
    pub const NETWORK: &str = "INTEGRATION_2004";
    pub const MALFORMED_RESPONSE: &str = "INTEGRATION_2005";
}

pub mod integrity {
    pub const VERSION_CONFLICT: &str = "INTEGRITY_3001";
}

pub mod configuration {
    pub const MISSING_SETTING: &str = "CONFIG_4001";
}

pub mod storage {
    pub const QUERY_FAILED: &str = "DB_5001";
    pub const CORRUPT_ROW: &str = "DB_5002";
}

pub mod internal {
    pub const SERIALIZATION: &str = "INTERNAL_9001";
}
