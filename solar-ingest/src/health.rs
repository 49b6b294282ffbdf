use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

/// Liveness probe. Holds no state, so any number of callers may hit it at
/// once without coordination.
pub fn probe() -> HealthStatus {
    HealthStatus { status: "healthy" }
}
