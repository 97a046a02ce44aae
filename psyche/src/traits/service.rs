use async_trait::async_trait;

/// Start/stop contract shared by every perception and IO service.
///
/// `stop` returns only once the service's loops have exited and released
/// any camera lease they held.
#[async_trait]
pub trait SensorService: Send + Sync {
    fn name(&self) -> &'static str;
    async fn start(&self);
    async fn stop(&self);
}

/// Face enrolment for a newly introduced user.
#[async_trait]
pub trait EnrollmentService: Send + Sync {
    /// Begin recording face samples for `username`.
    async fn enroll(&self, username: &str);
    /// Stop recording; samples already taken may still be processed.
    async fn stop(&self);
    /// Stop and wait until every recorded sample has been processed.
    async fn shutdown(&self) {
        self.stop().await;
    }
}
