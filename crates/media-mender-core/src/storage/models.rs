/// One row of the audit table: the last-known state of a file.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub path: String,
    pub file_type: String,
    pub status: String,
    pub checksum: Option<String>,
    pub timestamp: String,
    pub file_size: Option<i64>,
    pub error_message: Option<String>,
}
