//! Result type alias for the exporter

use super::errors::ExporterError;

/// Result type alias for exporter operations
///
/// # Examples
///
/// ```
/// use ingest_exporter::domain::result::Result;
/// use ingest_exporter::domain::errors::ExporterError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(ExporterError::Parse("missing documentUuid".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, ExporterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_with_question_mark() -> Result<()> {
        fn inner() -> Result<i32> {
            Ok(42)
        }

        let value = inner()?;
        assert_eq!(value, 42);
        Ok(())
    }
}
