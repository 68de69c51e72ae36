// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Ported from `filter_metrics.go`: matches CF metron gauge/counter/timer
//! structured-data blocks, extracts a typed `@metric` object and removes
//! the consumed block so it doesn't also leak through as raw structured
//! data.

use serde_json::{json, Map, Value};

use super::{is_metrics, Filter, COUNTER_STRUCTURED_DATA_ID, GAUGE_STRUCTURED_DATA_ID, TIMER_STRUCTURED_DATA_ID};
use crate::msg::SyslogMessage;

pub struct MetricsFilter;

impl Filter for MetricsFilter {
    fn matches(&self, msg: &SyslogMessage) -> bool {
        is_metrics(msg)
    }

    fn filter(&self, msg: &mut SyslogMessage) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("@source".into(), json!({"type": "metrics", "details": ""}));
        data.insert("@type".into(), json!("Metrics"));

        if let Some(gauge) = msg.structured_data.remove(GAUGE_STRUCTURED_DATA_ID) {
            let value = gauge.get("value").map(|s| s.as_str()).unwrap_or_default();
            let value = value
                .parse::<f64>()
                .map(|f| json!(f))
                .unwrap_or_else(|_| json!(value));
            data.insert(
                "@metric".into(),
                json!({
                    "type": "gauge",
                    "name": gauge.get("name").cloned().unwrap_or_default(),
                    "unit": gauge.get("unit").cloned().unwrap_or_default(),
                    "value": value,
                }),
            );
        }
        if let Some(counter) = msg.structured_data.remove(COUNTER_STRUCTURED_DATA_ID) {
            let total = typed_or_string(counter.get("total"));
            let delta = typed_or_string(counter.get("delta"));
            data.insert(
                "@metric".into(),
                json!({
                    "type": "counter",
                    "name": counter.get("name").cloned().unwrap_or_default(),
                    "total": total,
                    "delta": delta,
                }),
            );
        }
        if let Some(timer) = msg.structured_data.remove(TIMER_STRUCTURED_DATA_ID) {
            let start = typed_or_string(timer.get("start"));
            let stop = typed_or_string(timer.get("stop"));
            data.insert(
                "@metric".into(),
                json!({
                    "type": "timer",
                    "name": timer.get("name").cloned().unwrap_or_default(),
                    "start": start,
                    "stop": stop,
                }),
            );
        }

        data
    }
}

fn typed_or_string(v: Option<&String>) -> Value {
    let Some(v) = v else { return json!("") };
    v.parse::<i64>().map(|n| json!(n)).unwrap_or_else(|_| json!(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg;

    #[test]
    fn extracts_gauge_and_removes_structured_data() {
        let mut m = msg::parse(
            r#"<14>1 - host org - - [gauge@47450 name="cpu" value="1.5" unit="percent"] -"#,
        )
        .unwrap();
        let data = MetricsFilter.filter(&mut m);
        assert_eq!(data["@metric"]["type"], json!("gauge"));
        assert_eq!(data["@metric"]["value"], json!(1.5));
        assert!(!m.structured_data.contains_key("gauge@47450"));
    }
}
