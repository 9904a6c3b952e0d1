//! One training cycle end to end: fetch, aggregate, factorize, publish.

use std::time::Duration;

use serde::Serialize;

use crate::db::InteractionSource;
use crate::error::{AppError, AppResult};
use crate::models::TrainingMetrics;
use crate::registry::ModelRegistry;
use crate::services::aggregator::aggregate_events;
use crate::services::matrix::InteractionMatrix;
use crate::services::trainer::{self, NmfConfig};

/// Outcome of a successful training cycle
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub run_id: String,
    pub num_users: usize,
    pub num_movies: usize,
    #[serde(flatten)]
    pub metrics: TrainingMetrics,
}

pub async fn run_training_cycle(
    source: &dyn InteractionSource,
    registry: &dyn ModelRegistry,
    experiment_name: &str,
    config: &NmfConfig,
) -> AppResult<TrainingReport> {
    let events = source.fetch_events().await?;
    tracing::info!(event_count = events.len(), "Starting training cycle");

    let records = aggregate_events(&events)?;
    let matrix = InteractionMatrix::build(&records)?;

    let model = trainer::train(&matrix, config);
    let run_id = trainer::publish_run(registry, experiment_name, &model).await?;

    Ok(TrainingReport {
        run_id,
        num_users: matrix.num_users(),
        num_movies: matrix.num_movies(),
        metrics: model.metrics,
    })
}

/// Bounds a training cycle with a wall-clock deadline.
///
/// Data problems keep their own error variants so the API can answer 422;
/// everything else reports as a training failure.
pub async fn run_training_cycle_with_timeout(
    source: &dyn InteractionSource,
    registry: &dyn ModelRegistry,
    experiment_name: &str,
    config: &NmfConfig,
    timeout: Duration,
) -> AppResult<TrainingReport> {
    match tokio::time::timeout(
        timeout,
        run_training_cycle(source, registry, experiment_name, config),
    )
    .await
    {
        Ok(Ok(report)) => Ok(report),
        Ok(Err(e @ (AppError::NoInteractionData | AppError::Dimension(_)))) => Err(e),
        Ok(Err(error)) => Err(AppError::TrainingFailure(error.to_string())),
        Err(_elapsed) => Err(AppError::TrainingTimeout(timeout.as_secs())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockInteractionSource;
    use crate::models::InteractionEvent;
    use crate::registry::MockModelRegistry;
    use async_trait::async_trait;

    fn sample_events() -> Vec<InteractionEvent> {
        vec![
            InteractionEvent::Rated {
                user_id: 1,
                movie_id: 101,
                rating: 5.0,
                liked: true,
            },
            InteractionEvent::Rated {
                user_id: 1,
                movie_id: 102,
                rating: 3.0,
                liked: false,
            },
            InteractionEvent::Rated {
                user_id: 2,
                movie_id: 101,
                rating: 4.0,
                liked: false,
            },
            InteractionEvent::Watched {
                user_id: 2,
                movie_id: 102,
            },
        ]
    }

    fn permissive_registry() -> MockModelRegistry {
        let mut registry = MockModelRegistry::new();
        registry
            .expect_ensure_experiment()
            .returning(|_| Ok("exp-1".to_string()));
        registry
            .expect_create_run()
            .returning(|_, _| Ok("run-1".to_string()));
        registry.expect_log_param().returning(|_, _, _| Ok(()));
        registry.expect_log_metric().returning(|_, _, _| Ok(()));
        registry.expect_log_artifact().returning(|_, _, _| Ok(()));
        registry.expect_finish_run().returning(|_| Ok(()));
        registry
    }

    #[tokio::test]
    async fn test_full_cycle_reports_run() {
        let mut source = MockInteractionSource::new();
        source
            .expect_fetch_events()
            .returning(|| Ok(sample_events()));

        let registry = permissive_registry();

        let report =
            run_training_cycle(&source, &registry, "exp", &NmfConfig::default())
                .await
                .unwrap();

        assert_eq!(report.run_id, "run-1");
        assert_eq!(report.num_users, 2);
        assert_eq!(report.num_movies, 2);
        assert!(report.metrics.rmse.is_finite());
    }

    #[tokio::test]
    async fn test_empty_source_is_typed_error() {
        let mut source = MockInteractionSource::new();
        source.expect_fetch_events().returning(|| Ok(Vec::new()));

        let registry = MockModelRegistry::new();

        let result = run_training_cycle_with_timeout(
            &source,
            &registry,
            "exp",
            &NmfConfig::default(),
            Duration::from_secs(300),
        )
        .await;

        assert!(matches!(result, Err(AppError::NoInteractionData)));
    }

    #[tokio::test]
    async fn test_registry_failure_reported_as_training_failure() {
        let mut source = MockInteractionSource::new();
        source
            .expect_fetch_events()
            .returning(|| Ok(sample_events()));

        let mut registry = MockModelRegistry::new();
        registry
            .expect_ensure_experiment()
            .returning(|_| Err(AppError::RegistryUnavailable("down".to_string())));

        let result = run_training_cycle_with_timeout(
            &source,
            &registry,
            "exp",
            &NmfConfig::default(),
            Duration::from_secs(300),
        )
        .await;

        assert!(matches!(result, Err(AppError::TrainingFailure(_))));
    }

    struct SlowSource;

    #[async_trait]
    impl InteractionSource for SlowSource {
        async fn fetch_events(&self) -> AppResult<Vec<InteractionEvent>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycle_times_out() {
        let registry = MockModelRegistry::new();

        let result = run_training_cycle_with_timeout(
            &SlowSource,
            &registry,
            "exp",
            &NmfConfig::default(),
            Duration::from_secs(300),
        )
        .await;

        assert!(matches!(result, Err(AppError::TrainingTimeout(300))));
    }
}
