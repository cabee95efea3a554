use crate::utils::error::{EtlError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field_name: &str, value: &str, reason: impl Into<String>) -> EtlError {
    EtlError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(invalid(
                field_name,
                url_str,
                format!("Unsupported URL scheme: {}", scheme),
            )),
        },
        Err(e) => Err(invalid(
            field_name,
            url_str,
            format!("Invalid URL format: {}", e),
        )),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(invalid(field_name, path, "Path cannot be empty"));
    }

    if path.contains('\0') {
        return Err(invalid(field_name, path, "Path contains null bytes"));
    }

    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(
            field_name,
            value,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(
            field_name,
            &value.to_string(),
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

/// GCS bucket 命名規則: 3-63 字元、小寫英數與 `-` `_` `.`，頭尾必須是英數
pub fn validate_gcs_bucket_name(field_name: &str, bucket_name: &str) -> Result<()> {
    if bucket_name.len() < 3 || bucket_name.len() > 63 {
        return Err(invalid(
            field_name,
            bucket_name,
            "Bucket name must be between 3 and 63 characters",
        ));
    }

    if !bucket_name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid(
            field_name,
            bucket_name,
            "Bucket name can only contain lowercase letters, numbers, hyphens, underscores, and dots",
        ));
    }

    let alnum = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !alnum(bucket_name.chars().next()) || !alnum(bucket_name.chars().last()) {
        return Err(invalid(
            field_name,
            bucket_name,
            "Bucket name must start and end with a letter or number",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("api_url", "https://api.fda.gov/drug/event.json").is_ok());
        assert!(validate_url("api_url", "http://localhost:8080").is_ok());
        assert!(validate_url("api_url", "").is_err());
        assert!(validate_url("api_url", "invalid-url").is_err());
        assert!(validate_url("api_url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("num_shards", 5, 1, 1000).is_ok());
        assert!(validate_range("num_shards", 0, 1, 1000).is_err());
    }

    #[test]
    fn test_validate_gcs_bucket_name() {
        assert!(validate_gcs_bucket_name("bucket", "drug-events").is_ok());
        assert!(validate_gcs_bucket_name("bucket", "my_bucket.v2").is_ok());
        assert!(validate_gcs_bucket_name("bucket", "ab").is_err());
        assert!(validate_gcs_bucket_name("bucket", "Drug-Events").is_err());
        assert!(validate_gcs_bucket_name("bucket", "-drug-events").is_err());
        assert!(validate_gcs_bucket_name("bucket", "drug-events_").is_err());
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("ingestion_path", "ingestion").is_ok());
        assert!(validate_path("ingestion_path", "  ").is_err());
        assert!(validate_path("ingestion_path", "bad\0path").is_err());
    }
}
