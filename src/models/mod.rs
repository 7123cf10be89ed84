pub mod anomaly;
pub mod pollutant;
pub mod reading;

pub use anomaly::{AnomalyAlert, AnomalyEvidence, AnomalyKind, AnomalyRecord, Severity};
pub use pollutant::{Pollutant, ThresholdTable};
pub use reading::Reading;
