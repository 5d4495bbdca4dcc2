/// Prints a progress line prefixed with the local timestamp.
/// Pass a starting time first and it also prints how long it took from then to now.
/// ```
/// use strassen_scrap::info_time;
/// info_time!("streets {}, prefixes {}", 1, 2);
/// let time = chrono::Local::now();
/// info_time!(time, "streets {}, prefixes {}", 1, 2);
/// ```
#[macro_export]
macro_rules! info_time {
    ($strfm:literal $(,)? $($arg:expr),*) => {{
        let local_now = ::chrono::Local::now();
        println!("{:<30} : {}", local_now, format!($strfm, $($arg),*));
    }};
    ($time:expr, $strfm:literal $(,)? $($arg:expr),*) => {{
        let local_now = ::chrono::Local::now();
        println!(
            "{:<30} : {}\nRUNTIME: {} sec",
            local_now,
            format!($strfm, $($arg),*),
            $crate::macros::elapsed_secs($time, local_now)
        );
    }};
}

/// Same layout as [`info_time!`] but written to stderr, for failures the crawl survives.
#[macro_export]
macro_rules! warn_time {
    ($strfm:literal $(,)? $($arg:expr),*) => {{
        let local_now = ::chrono::Local::now();
        eprintln!("{:<30} : WARN {}", local_now, format!($strfm, $($arg),*));
    }};
}

#[doc(hidden)]
pub fn elapsed_secs(
    start: chrono::DateTime<chrono::Local>,
    now: chrono::DateTime<chrono::Local>,
) -> f64 {
    (now - start)
        .num_microseconds()
        .map(|n| n as f64 / 1_000_000.0)
        .unwrap_or(0.0)
}
