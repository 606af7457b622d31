//! `datetime` and `weather` tools. `weather` geocodes a place name then
//! maps the current-weather numeric code to a human description.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::{ContextHandle, SecurityLevel, Tool, ToolMetadata, ToolOutput, ToolParam, ToolSpec};

pub struct DateTimeTool;

#[async_trait]
impl Tool for DateTimeTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "datetime".to_string(),
            description: "Report the current date and time, optionally in an IANA timezone."
                .to_string(),
            params: vec![ToolParam {
                name: "timezone".to_string(),
                description: "IANA timezone name (default: UTC)".to_string(),
                required: false,
                ..Default::default()
            }],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: true,
                group: "datetime".to_string(),
            },
        }
    }

    async fn run(&self, _ctx: &dyn ContextHandle, args: &HashMap<String, Value>) -> Result<ToolOutput> {
        let tz_name = args.get("timezone").and_then(Value::as_str).unwrap_or("UTC");
        let now = chrono::Utc::now();

        match tz_name.parse::<chrono_tz::Tz>() {
            Ok(tz) => Ok(ToolOutput::ok(
                now.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z").to_string(),
            )),
            Err(_) => Ok(ToolOutput::fail(format!("unknown timezone '{tz_name}'"))),
        }
    }
}

fn weather_code_description(code: i64) -> &'static str {
    match code {
        0 => "Clear sky",
        1..=3 => "Partly cloudy",
        45 | 48 => "Foggy",
        51..=55 => "Drizzle",
        61..=65 => "Rain",
        66 | 67 => "Freezing rain",
        71..=75 => "Snow",
        77 => "Snow grains",
        80..=82 => "Rain showers",
        85 | 86 => "Snow showers",
        95 => "Thunderstorm",
        96 | 99 => "Thunderstorm with hail",
        _ => "Unknown",
    }
}

pub struct WeatherTool;

#[async_trait]
impl Tool for WeatherTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "weather".to_string(),
            description: "Look up the current weather for a place name.".to_string(),
            params: vec![ToolParam {
                name: "location".to_string(),
                description: "Place name to geocode".to_string(),
                required: true,
                ..Default::default()
            }],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: true,
                group: "weather".to_string(),
            },
        }
    }

    async fn run(&self, _ctx: &dyn ContextHandle, args: &HashMap<String, Value>) -> Result<ToolOutput> {
        let Some(location) = args.get("location").and_then(Value::as_str) else {
            return Ok(ToolOutput::fail("missing required param: location"));
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent("turnkeep/0.1")
            .build()?;

        let geocode: Value = client
            .get("https://geocoding-api.open-meteo.com/v1/search")
            .query(&[("name", location), ("count", "1")])
            .send()
            .await?
            .json()
            .await?;

        let Some(result) = geocode["results"].as_array().and_then(|r| r.first()) else {
            return Ok(ToolOutput::fail(format!("location not found: {location}")));
        };
        let (Some(lat), Some(lon)) = (result["latitude"].as_f64(), result["longitude"].as_f64())
        else {
            return Ok(ToolOutput::fail("geocoding response missing coordinates"));
        };
        let resolved_name = result["name"].as_str().unwrap_or(location);

        let weather: Value = client
            .get("https://api.open-meteo.com/v1/forecast")
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("current_weather", "true".to_string()),
            ])
            .send()
            .await?
            .json()
            .await?;

        let Some(current) = weather.get("current_weather") else {
            return Ok(ToolOutput::fail("UPSTREAM_ERROR: no current_weather in response"));
        };
        let temp = current["temperature"].as_f64().unwrap_or(f64::NAN);
        let wind = current["windspeed"].as_f64().unwrap_or(f64::NAN);
        let code = current["weathercode"].as_i64().unwrap_or(-1);
        let description = weather_code_description(code);

        Ok(ToolOutput::ok(format!(
            "{resolved_name}: {description}, {temp:.1}°C, wind {wind:.1} km/h"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weather_code_table_matches_ranges() {
        assert_eq!(weather_code_description(0), "Clear sky");
        assert_eq!(weather_code_description(2), "Partly cloudy");
        assert_eq!(weather_code_description(61), "Rain");
        assert_eq!(weather_code_description(96), "Thunderstorm with hail");
        assert_eq!(weather_code_description(12345), "Unknown");
    }

    #[tokio::test]
    async fn datetime_rejects_unknown_timezone() {
        let ctx = crate::test_support::FakeContext::new(std::env::temp_dir());
        let mut args = HashMap::new();
        args.insert("timezone".to_string(), Value::String("Mars/Olympus_Mons".into()));
        let out = DateTimeTool.run(&ctx, &args).await.unwrap();
        assert!(!out.success);
    }
}
