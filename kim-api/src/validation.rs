use std::fmt;

/// Field-level validation failures of a resource spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// `Kind namespace/name` of the offending resource.
    pub resource: String,
    /// `(field path, message)` pairs.
    pub fields: Vec<(String, String)>,
}

impl ValidationError {
    pub(crate) fn from_report(resource: String, report: &garde::Report) -> Self {
        let fields = report
            .iter()
            .map(|(path, error)| {
                let field = path.to_string();
                let field = if field.is_empty() { "spec".to_string() } else { field };
                (field, error.message().to_string())
            })
            .collect();
        Self { resource, fields }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is invalid", self.resource)?;
        for (i, (field, message)) in self.fields.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{field}: {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}
