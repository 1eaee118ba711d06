//! Hard service limits. Scheduling constants live in `config`.

/// Screen networks served by one process.
pub const MAX_TENANTS: usize = 1024;

pub const MAX_TENANT_NAME_LEN: usize = 256;

/// Owner ids and content ids.
pub const MAX_ID_LEN: usize = 128;

pub const MAX_CONTENT_NAME_LEN: usize = 512;

/// Distinct ads sharing one slot. A slot of 3600s already caps this in practice.
pub const MAX_ADS_PER_SLOT: usize = 512;

/// Rows accepted in one multi-row INSERT.
pub const MAX_INSERT_ROWS: usize = 1024;
