use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No camera found!")]
    NoDeviceFound,
    #[error("Failed to open camera {device}: {source}")]
    DeviceOpen {
        device: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Plan line {line}: expected 5 fields, found {found}")]
    MalformedPlanLine { line: usize, found: usize },
    #[error("Plan line {line}: invalid {field} {value:?}")]
    InvalidFieldFormat {
        line: usize,
        field: &'static str,
        value: String,
    },
    #[error("Camera returned no data for frame {frame}")]
    EmptyCaptureBuffer { frame: usize },
    #[error("Feature {0} not available on this camera")]
    FeatureUnavailable(String),
    #[error("Feature {name} is not a {expected}")]
    FeatureType {
        name: String,
        expected: &'static str,
    },
    #[error("{name} {value} outside of camera bounds [{min}, {max}]")]
    OutOfBounds {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("Acquisition not started")]
    NotAcquiring,
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type SensorResult<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_errors_name_the_line() {
        let err = Error::MalformedPlanLine { line: 4, found: 3 };
        assert_eq!(err.to_string(), "Plan line 4: expected 5 fields, found 3");
        let err = Error::InvalidFieldFormat {
            line: 2,
            field: "gain",
            value: "ten".into(),
        };
        assert_eq!(err.to_string(), "Plan line 2: invalid gain \"ten\"");
    }

    #[test]
    fn anyhow_converts_to_other() {
        let err: Error = anyhow::anyhow!("boom").into();
        assert!(matches!(err, Error::Other(_)));
        assert_eq!(err.to_string(), "boom");
    }
}
