use std::collections::HashMap;

use prometheus_parse::{Sample, Scrape, Value};

use crate::error::{FixtureError, Result};
use crate::http::HttpClient;

/// All samples sharing one metric name, plus the HELP text when the exporter
/// published one.
#[derive(Debug)]
pub struct MetricFamily {
    pub name: String,
    pub help: Option<String>,
    pub samples: Vec<Sample>,
}

/// Single-number reading of a sample value, for the scalar metric kinds.
/// Histograms and summaries have no single value and yield `None`.
pub fn sample_value(value: &Value) -> Option<f64> {
    match value {
        Value::Counter(x) | Value::Gauge(x) | Value::Untyped(x) => Some(*x),
        _ => None,
    }
}

/// Parses Prometheus exposition text into a mapping keyed by metric name.
pub fn parse_metric_families(body: &str) -> Result<HashMap<String, MetricFamily>> {
    let lines = body.lines().map(|l| Ok(l.to_owned()));
    let scrape = Scrape::parse(lines)
        .map_err(|e| FixtureError::Http(format!("unparsable exposition text: {e}")))?;

    let mut families: HashMap<String, MetricFamily> = HashMap::new();
    for sample in scrape.samples {
        families
            .entry(sample.metric.clone())
            .or_insert_with(|| MetricFamily {
                name: sample.metric.clone(),
                help: scrape.docs.get(&sample.metric).cloned(),
                samples: Vec::new(),
            })
            .samples
            .push(sample);
    }
    Ok(families)
}

/// GETs `url` through the given transport and parses the body.
pub async fn scrape(client: &dyn HttpClient, url: &str) -> Result<HashMap<String, MetricFamily>> {
    let response = client.get(url).await?;
    if response.status != 200 {
        return Err(FixtureError::Http(format!(
            "scrape of {url} returned status {}",
            response.status
        )));
    }
    let body = String::from_utf8_lossy(&response.body).into_owned();
    parse_metric_families(&body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;

    use async_trait::async_trait;
    use indoc::indoc;

    const EXPOSITION: &str = indoc! {r#"
        # HELP up Whether the target is up.
        # TYPE up gauge
        up 1
        # HELP requests_total Requests served.
        # TYPE requests_total counter
        requests_total{code="200"} 7
        requests_total{code="500"} 2
        scrape_duration_seconds 0.004
    "#};

    #[test]
    fn families_group_samples_by_metric_name() {
        let families = parse_metric_families(EXPOSITION).unwrap();
        assert_eq!(families.len(), 3, "got: {:?}", families.keys().collect::<Vec<_>>());

        let up = families.get("up").expect("up family");
        assert_eq!(up.help.as_deref(), Some("Whether the target is up."));
        assert_eq!(up.samples.len(), 1);
        assert_eq!(sample_value(&up.samples[0].value), Some(1.0));

        let requests = families.get("requests_total").expect("requests_total family");
        assert_eq!(requests.samples.len(), 2);

        let untyped = families.get("scrape_duration_seconds").expect("undocumented family");
        assert!(untyped.help.is_none());
    }

    #[test]
    fn garbage_body_is_a_parse_error() {
        let err = parse_metric_families("up one\n").unwrap_err();
        assert!(matches!(err, FixtureError::Http(_)), "got: {err:?}");
    }

    struct StaticTransport {
        status: u16,
        body: &'static str,
    }

    #[async_trait]
    impl HttpClient for StaticTransport {
        async fn get(&self, _url: &str) -> crate::Result<HttpResponse> {
            Ok(HttpResponse {
                status: self.status,
                headers: vec![("content-type".to_owned(), "text/plain".to_owned())],
                body: self.body.as_bytes().to_vec().into(),
            })
        }
    }

    #[tokio::test]
    async fn scrape_parses_a_successful_response() {
        let transport = StaticTransport { status: 200, body: EXPOSITION };
        let families = scrape(&transport, "http://127.0.0.1:9/metrics").await.unwrap();
        assert!(families.contains_key("up"));
    }

    #[tokio::test]
    async fn scrape_rejects_non_200_responses() {
        let transport = StaticTransport { status: 503, body: "" };
        let err = scrape(&transport, "http://127.0.0.1:9/metrics").await.unwrap_err();
        assert!(matches!(err, FixtureError::Http(_)), "got: {err:?}");
    }
}
