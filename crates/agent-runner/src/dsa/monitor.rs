use std::future::Future;
use std::time::Instant;

use tracing::info;

/// Await `fut` and log how long it took
pub async fn timed<F, T>(component: &str, fut: F) -> T
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let output = fut.await;
    info!(
        "{} took {:.4} seconds",
        component,
        start.elapsed().as_secs_f64()
    );
    output
}
