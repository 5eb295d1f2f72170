//! Shared fixtures: deterministic intraday sessions in New York time.

#![allow(dead_code)]

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use simsearch::prelude::*;

/// 09:30 to 15:55 every five minutes.
pub const BARS_PER_SESSION: usize = 78;

/// Session (0-based) whose bars are copied into the last session of [`repeating_series`].
pub const REPEATED_SESSION: usize = 9;

pub fn local(date: NaiveDate, h: u32, m: u32) -> DateTime<Utc> {
    let naive = date.and_hms_opt(h, m, 0).unwrap();
    DEFAULT_TZ
        .from_local_datetime(&naive)
        .unwrap()
        .with_timezone(&Utc)
}

/// First `n` weekdays from 2024-07-01.
pub fn trading_days(n: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(n);
    let mut d = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
    while days.len() < n {
        if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(d);
        }
        d = d.succ_opt().unwrap();
    }
    days
}

fn price(i: usize, shift: f64) -> f64 {
    let x = i as f64;
    100.0 + shift + 0.01 * x + 2.0 * (x * 0.37).sin() + ((i * 7 + 13) % 17) as f64 / 10.0
}

fn session_bars(date: NaiveDate, seed: usize, shift: f64) -> Vec<Bar> {
    let open = local(date, 9, 30);
    (0..BARS_PER_SESSION)
        .map(|k| {
            let i = seed * BARS_PER_SESSION + k;
            let c = price(i, shift);
            let o = price(i + 1, shift) - 0.05;
            let h = o.max(c) + 0.2 + (i % 3) as f64 * 0.05;
            let l = o.min(c) - 0.2;
            let v = 1_000.0 + (i % 50) as f64 * 10.0;
            Bar::new(open + Duration::minutes(5 * k as i64), o, h, l, c, v)
        })
        .collect()
}

/// `sessions` trading days of bars, prices offset by `shift`.
pub fn series_with_shift(sessions: usize, shift: f64) -> TimeSeries {
    let bars = trading_days(sessions)
        .into_iter()
        .enumerate()
        .flat_map(|(s, date)| session_bars(date, s, shift))
        .collect();
    TimeSeries::with_default_tz(bars).unwrap()
}

/// Forty sessions; the last one repeats session [`REPEATED_SESSION`] bar for bar.
pub fn repeating_series() -> TimeSeries {
    let days = trading_days(40);
    let mut bars = Vec::with_capacity(days.len() * BARS_PER_SESSION);
    for (s, date) in days.iter().enumerate() {
        let seed = if s == days.len() - 1 { REPEATED_SESSION } else { s };
        bars.extend(session_bars(*date, seed, 0.0));
    }
    TimeSeries::with_default_tz(bars).unwrap()
}

/// Noon of the last session in [`repeating_series`].
pub fn noon_of_last_session() -> DateTime<Utc> {
    local(*trading_days(40).last().unwrap(), 12, 0)
}
