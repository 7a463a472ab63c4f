pub mod image_ref;
pub mod report_artifact;
pub mod scan_finding;
pub mod scan_query;
pub mod scan_status;
pub mod severity;
pub mod tag_patterns;
pub mod vulnerability_record;
