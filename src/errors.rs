use distinst_disks::DiskError;
use distinst_geometry::GeometryError;

/// The top-level error type for every planner-visible operation.
///
/// Follows `crates/disks/src/error.rs`'s convention exactly: one display message per variant,
/// and `From` conversions so component errors compose into it without boilerplate at the call
/// site. A `PlannerError` is either a fatal programming error (`Geometry`, `Disk`) or a
/// user-facing rejection (`NoVariationForCapability`, `AutoinstallValidationError`); nothing in
/// this crate maps a successful operation onto one.
#[derive(Debug, Fail)]
pub enum PlannerError {
    #[fail(display = "{}", why)]
    Disk { why: DiskError },
    #[fail(display = "{}", why)]
    Geometry { why: GeometryError },
    #[fail(display = "probe phase {} failed: {}", phase, why)]
    ProbeFailed { phase: String, why: String },
    #[fail(display = "no core-boot systems were found on the installation source")]
    NoSnapdSystemsOnSource,
    #[fail(display = "no variation supports capability {:?}", capability)]
    NoVariationForCapability { capability: crate::capability::GuidedCapability },
    #[fail(display = "autoinstall config rejected: {}", why)]
    AutoinstallValidationError { why: String },
    #[fail(display = "autoinstall error: {}", why)]
    AutoinstallError { why: String },
    #[fail(display = "external system request failed: {}", why)]
    ExternalSystemError { why: String },
    #[fail(display = "{}", why)]
    Serialization { why: serde_json::Error },
    #[fail(display = "{}", why)]
    Io { why: std::io::Error },
}

impl From<DiskError> for PlannerError {
    fn from(why: DiskError) -> PlannerError { PlannerError::Disk { why } }
}

impl From<GeometryError> for PlannerError {
    fn from(why: GeometryError) -> PlannerError { PlannerError::Geometry { why } }
}

impl From<serde_json::Error> for PlannerError {
    fn from(why: serde_json::Error) -> PlannerError { PlannerError::Serialization { why } }
}

impl From<std::io::Error> for PlannerError {
    fn from(why: std::io::Error) -> PlannerError { PlannerError::Io { why } }
}
