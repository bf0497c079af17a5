use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub matches_total: IntCounterVec,
    pub scoring_latency_seconds: HistogramVec,
    pub notifications_in_queue: IntGauge,
    pub notifications_sent_total: IntCounterVec,
    pub trip_utilization: GaugeVec,
    pub deliveries_confirmed_total: IntCounter,
    pub otp_requests_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let matches_total = IntCounterVec::new(
            Opts::new("matches_total", "Match lifecycle transitions by outcome"),
            &["outcome"],
        )
        .expect("valid matches_total metric");

        let scoring_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "scoring_latency_seconds",
                "Latency of a candidate search in seconds",
            ),
            &["direction"],
        )
        .expect("valid scoring_latency_seconds metric");

        let notifications_in_queue = IntGauge::new(
            "notifications_in_queue",
            "Notifications waiting for the dispatcher",
        )
        .expect("valid notifications_in_queue metric");

        let notifications_sent_total = IntCounterVec::new(
            Opts::new("notifications_sent_total", "Notifications sent by channel"),
            &["channel"],
        )
        .expect("valid notifications_sent_total metric");

        let trip_utilization = GaugeVec::new(
            Opts::new("trip_utilization", "Share of trip weight capacity in use [0..1]"),
            &["trip_id"],
        )
        .expect("valid trip_utilization metric");

        let deliveries_confirmed_total = IntCounter::new(
            "deliveries_confirmed_total",
            "Deliveries confirmed with a valid code",
        )
        .expect("valid deliveries_confirmed_total metric");

        let otp_requests_total = IntCounterVec::new(
            Opts::new("otp_requests_total", "Phone code requests by outcome"),
            &["outcome"],
        )
        .expect("valid otp_requests_total metric");

        registry
            .register(Box::new(matches_total.clone()))
            .expect("register matches_total");
        registry
            .register(Box::new(scoring_latency_seconds.clone()))
            .expect("register scoring_latency_seconds");
        registry
            .register(Box::new(notifications_in_queue.clone()))
            .expect("register notifications_in_queue");
        registry
            .register(Box::new(notifications_sent_total.clone()))
            .expect("register notifications_sent_total");
        registry
            .register(Box::new(trip_utilization.clone()))
            .expect("register trip_utilization");
        registry
            .register(Box::new(deliveries_confirmed_total.clone()))
            .expect("register deliveries_confirmed_total");
        registry
            .register(Box::new(otp_requests_total.clone()))
            .expect("register otp_requests_total");

        Self {
            registry,
            matches_total,
            scoring_latency_seconds,
            notifications_in_queue,
            notifications_sent_total,
            trip_utilization,
            deliveries_confirmed_total,
            otp_requests_total,
        }
    }

    pub fn record_match(&self, outcome: &str) {
        self.matches_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_trip_utilization(&self, trip_id: &str, ratio: f64) {
        self.trip_utilization
            .with_label_values(&[trip_id])
            .set(ratio.clamp(0.0, 1.0));
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
