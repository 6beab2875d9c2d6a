//! Request interceptor: the single entry point for outgoing requests.

use std::sync::Arc;

use tracing::debug;

use crate::classify::{Category, RouteClassifier};
use crate::config::StrategyTable;
use crate::error::OfflineResult;
use crate::fetch::Fetcher;
use crate::inflight::InFlightTracker;
use crate::store::CacheStore;
use crate::strategy::{Strategy, StrategyEngine};
use crate::types::{Request, Served};

/// Classifies each request and runs the strategy assigned to its category.
pub struct Interceptor<S, F> {
    classifier: RouteClassifier,
    strategies: StrategyTable,
    engine: StrategyEngine<S, F>,
    in_flight: Arc<InFlightTracker>,
}

impl<S, F> Interceptor<S, F>
where
    S: CacheStore,
    F: Fetcher,
{
    pub fn new(
        classifier: RouteClassifier,
        strategies: StrategyTable,
        engine: StrategyEngine<S, F>,
        in_flight: Arc<InFlightTracker>,
    ) -> Self {
        Self {
            classifier,
            strategies,
            engine,
            in_flight,
        }
    }

    /// Category and strategy a request would be served with.
    ///
    /// Mutating requests always report never-cache.
    pub fn route(&self, request: &Request) -> (Category, Strategy) {
        let category = self.classifier.classify_request(request);
        let strategy = if request.is_read_only() {
            self.strategies.for_category(category)
        } else {
            Strategy::NeverCache
        };
        (category, strategy)
    }

    /// Serve one request.
    pub async fn handle(&self, request: &Request) -> OfflineResult<Served> {
        let _guard = self.in_flight.begin();
        let (category, strategy) = self.route(request);
        debug!(
            method = %request.method,
            url = %request.url,
            category = %category,
            strategy = %strategy,
            "intercepted request"
        );
        self.engine.execute(strategy, request).await
    }

    /// Tracker counting requests currently inside [`handle`](Self::handle).
    pub fn in_flight(&self) -> &Arc<InFlightTracker> {
        &self.in_flight
    }

    pub fn classifier(&self) -> &RouteClassifier {
        &self.classifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCacheStore;
    use crate::strategy::StrategyPolicy;
    use crate::types::ResponseSnapshot;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Fetcher for Echo {
        async fn fetch(&self, request: &Request) -> OfflineResult<ResponseSnapshot> {
            Ok(ResponseSnapshot::new(200, request.path().to_string()))
        }
    }

    fn interceptor() -> Interceptor<MemoryCacheStore, Echo> {
        let engine = StrategyEngine::new(
            Arc::new(MemoryCacheStore::new()),
            Arc::new(Echo),
            StrategyPolicy::default(),
        );
        Interceptor::new(
            RouteClassifier::new(["/predict", "/save"]),
            StrategyTable::default(),
            engine,
            Arc::new(InFlightTracker::new()),
        )
    }

    #[test]
    fn test_route_uses_strategy_table() {
        let i = interceptor();
        let base = "http://localhost:8000";

        let nav = Request::navigate(&format!("{base}/")).unwrap();
        assert_eq!(i.route(&nav), (Category::NavigationDocument, Strategy::NetworkFirst));

        let asset = Request::get(&format!("{base}/app.js")).unwrap();
        assert_eq!(i.route(&asset), (Category::StaticAsset, Strategy::CacheFirst));

        let data = Request::get(&format!("{base}/predict/PL")).unwrap();
        assert_eq!(i.route(&data), (Category::NetworkData, Strategy::NeverCache));
    }

    #[test]
    fn test_mutating_request_routes_to_never_cache() {
        let i = interceptor();
        let post = Request::post("http://localhost:8000/styles.css", None).unwrap();
        assert_eq!(i.route(&post), (Category::StaticAsset, Strategy::NeverCache));
    }

    #[tokio::test]
    async fn test_handle_releases_in_flight_slot() {
        let i = interceptor();
        let request = Request::get("http://localhost:8000/app.js").unwrap();

        let served = i.handle(&request).await.unwrap();
        assert_eq!(served.response.text(), "/app.js");
        assert_eq!(i.in_flight().in_flight(), 0);
    }
}
