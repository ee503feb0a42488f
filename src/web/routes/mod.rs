pub mod alert_routes;
pub mod site_routes;
pub mod task_routes;

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::db::enums::{AlertType, Severity};
    use crate::db::models::{Alert, NewSite, Site};
    use crate::db::repository::AlertRepository;
    use crate::notifications::testing::RecordingNotifier;
    use crate::scheduler::clock::SystemClock;
    use crate::server::config::{MonitorConfig, PartialMonitorConfig};
    use crate::server::{MonitorRuntime, Repositories};
    use crate::web::{AppState, create_router};

    /// Admin router served on an ephemeral port over in-memory repositories.
    pub struct TestApp {
        pub base: String,
        pub client: reqwest::Client,
        pub runtime: MonitorRuntime,
        pub repos: Repositories,
    }

    impl TestApp {
        pub async fn spawn() -> Self {
            Self::start(false).await
        }

        pub async fn spawn_with_scheduler() -> Self {
            Self::start(true).await
        }

        async fn start(with_scheduler: bool) -> Self {
            let config = MonitorConfig::merge(
                PartialMonitorConfig::default(),
                PartialMonitorConfig::default(),
                true,
            )
            .unwrap();
            let repos = Repositories::in_memory();
            let runtime = MonitorRuntime::with_notifier(
                &config,
                repos.clone(),
                Arc::new(RecordingNotifier::new()),
                Arc::new(SystemClock),
            )
            .unwrap();
            let scheduler = with_scheduler.then(|| {
                Arc::new(
                    runtime
                        .scheduler(&config)
                        .without_initial_run()
                        .start(Duration::from_secs(1)),
                )
            });
            let state = Arc::new(AppState {
                monitor: runtime.monitor.clone(),
                scheduler,
            });

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base = format!("http://{}", listener.local_addr().unwrap());
            tokio::spawn(async move {
                axum::serve(listener, create_router(state)).await.unwrap();
            });

            Self {
                base,
                client: reqwest::Client::new(),
                runtime,
                repos,
            }
        }

        pub fn url(&self, path: &str) -> String {
            format!("{}{}", self.base, path)
        }

        pub async fn register(&self, name: &str) -> Site {
            self.register_with_endpoint(name, "http://127.0.0.1:1/health").await
        }

        pub async fn register_with_endpoint(&self, name: &str, endpoint: &str) -> Site {
            let new_site: NewSite = serde_json::from_value(serde_json::json!({
                "name": name,
                "url": format!("https://{}.example", name.to_lowercase()),
                "site_type": "community",
                "endpoint_health": endpoint,
            }))
            .unwrap();
            self.runtime.monitor.register_site(new_site).await.unwrap()
        }

        pub async fn open_alert(&self, site: &Site, alert_type: AlertType, severity: Severity) -> Alert {
            self.repos
                .alerts
                .insert(Alert::new_open(
                    site.id,
                    alert_type,
                    severity,
                    format!("{} alert", site.name),
                    "raised by test".into(),
                    Utc::now(),
                ))
                .await
                .unwrap()
        }
    }
}
