/// Test fixtures: representative JSON payloads from the forecast API.
///
/// These are structurally faithful but truncated to the minimum needed to
/// exercise the decoder. They reflect the envelope returned by
///   https://api.open-meteo.com/v1/forecast?...&timezone=UTC
///
/// Response shape:
///   latitude, longitude, elevation, timezone
///   hourly_units / minutely_15_units  — ignored
///   hourly.time[]                     — naive ISO 8601 in UTC ("2024-01-05T00:00")
///   hourly.<variable>[]               — parallel to time[], numbers or null
///   minutely_15.time[] / <variable>[] — same layout, 15-minute spacing
///
/// Older responses used `weathercode` instead of `weather_code`.

/// Zugspitze, both series complete. Cold night with rising wind and a
/// rain code at 02:00.
pub(crate) fn fixture_zugspitze_json() -> &'static str {
    r#"{
      "latitude": 47.42,
      "longitude": 10.98,
      "elevation": 2962.0,
      "timezone": "GMT",
      "hourly_units": { "time": "iso8601", "temperature_2m": "°C", "wind_speed_10m": "km/h" },
      "hourly": {
        "time": ["2024-01-05T00:00", "2024-01-05T01:00", "2024-01-05T02:00", "2024-01-05T03:00"],
        "temperature_2m": [-12.5, -11.0, -9.5, -8.0],
        "rain": [0.0, 0.0, 0.4, 0.0],
        "snowfall": [0.0, 0.0, 0.0, 0.0],
        "wind_speed_10m": [40.0, 60.0, 65.0, 30.0],
        "weather_code": [3, 3, 61, 2],
        "wind_direction_10m": [270, 275, 280, 290],
        "uv_index": [0.0, 0.0, 0.0, 0.0]
      },
      "minutely_15": {
        "time": ["2024-01-05T00:00", "2024-01-05T00:15", "2024-01-05T00:30"],
        "temperature_2m": [-12.5, -12.4, -12.2],
        "rain": [0.0, 0.0, 0.0],
        "snowfall": [0.0, 0.1, 0.0],
        "wind_speed_10m": [40.0, 42.0, 59.0],
        "weather_code": [3, 71, 3],
        "wind_direction_10m": [270, 270, 272]
      }
    }"#
}

/// Ragged hourly series: wind shorter than time, temperature absent,
/// empty `weather_code` with the legacy `weathercode` populated, no
/// minutely series at all.
pub(crate) fn fixture_ragged_json() -> &'static str {
    r#"{
      "latitude": 45.83,
      "longitude": 6.86,
      "hourly": {
        "time": ["2024-01-05T00:00", "2024-01-05T01:00", "2024-01-05T02:00"],
        "wind_speed_10m": [60.0],
        "rain": [0.0, 0.0],
        "weather_code": [],
        "weathercode": [61, 3, 0]
      }
    }"#
}

/// Malformed entries: an unparsable timestamp, a duplicate timestamp, a
/// non-numeric wind value, a numeric string, and a fractional weather code.
pub(crate) fn fixture_malformed_json() -> &'static str {
    r#"{
      "hourly": {
        "time": ["2024-01-05T00:00", "not-a-time", "2024-01-05T02:00", "2024-01-05T02:00"],
        "wind_speed_10m": ["calm", 12.0, 50.0, "66"],
        "weather_code": [61.5, 3, 3, 3]
      }
    }"#
}
