//! Gregorian calendar utilities
//!
//! The date conversions are based off Cassio Neri and Lorenz Schneider's paper,
//! [Euclidean affine functions and their application to calendar algorithms][eaf-calendar-algorithms].
//!
//! Epoch days are clamped to `[-100_000_001, 100_000_001]`, which covers every year
//! a zoneinfo source can express along with the `BEGINNING_OF_TIME` and
//! `END_OF_TIME` sentinels.
//!
//! [eaf-calendar-algorithms]: https://onlinelibrary.wiley.com/doi/full/10.1002/spe.3172

pub const SECONDS_PER_DAY: i64 = 86_400;

/// The first year of the supported range.
pub const MIN_YEAR: i32 = -271_821;

/// The last year of the supported range.
pub const MAX_YEAR: i32 = 275_760;

/// The maximum supported epoch day magnitude.
pub const MAX_EPOCH_DAYS: i64 = 100_000_001;

const EPOCH_COMPUTATIONAL_RATA_DIE: i32 = 719_468;
const DAYS_IN_A_400Y_CYCLE: u32 = 146_097;

const TWO_POWER_THIRTY_NINE: u64 = 549_755_813_888; // 2^39 constant
const TWO_POWER_SIXTEEN: u32 = 65_536; // 2^16 constant

// Places the epoch in the center of the computational range.
const SHIFT_CONSTANT: i32 = 3670;
const SHIFT_CONSTANT_EXTENDED: i64 = 5_368_710;

/// Calculate the epoch days for a gregorian year, month (1 based) and day (1 based).
///
/// Out of range months and days roll over, i.e. day 32 of January is February 1st.
pub const fn epoch_days_from_gregorian_date(year: i32, month: u8, day: u8) -> i64 {
    let shift =
        SHIFT_CONSTANT_EXTENDED * DAYS_IN_A_400Y_CYCLE as i64 + EPOCH_COMPUTATIONAL_RATA_DIE as i64;
    let j = (month <= 2) as i64;
    let comp_year = (year as i64 + 400 * SHIFT_CONSTANT_EXTENDED) - j;
    let comp_month = month as i64 + 12 * j;
    let comp_day = day as i64 - 1;
    let century = comp_year / 100;
    let y_star = 1461 * comp_year / 4 - century + century / 4;
    let m_star = (979 * comp_month - 2919) / 32;
    (y_star + m_star + comp_day) - shift
}

/// Returns the gregorian `(year, month, day)` for the provided epoch days.
pub const fn ymd_from_epoch_days(epoch_days: i64) -> (i32, u8, u8) {
    let epoch_days = clamp_epoch_days(epoch_days) as i32;
    let rata_die = (epoch_days
        + EPOCH_COMPUTATIONAL_RATA_DIE
        + DAYS_IN_A_400Y_CYCLE as i32 * SHIFT_CONSTANT) as u32;
    let n_one = 4 * rata_die + 3;
    let century = n_one / DAYS_IN_A_400Y_CYCLE;
    let n_two = (n_one % DAYS_IN_A_400Y_CYCLE) | 3;
    let year_of_century = ((376_287_347 * n_two as u64) / TWO_POWER_THIRTY_NINE) as u32;
    let day_of_year = (n_two - 1461 * year_of_century) / 4;
    let n_three = 2141 * day_of_year + 197_913;
    let comp_month = n_three / TWO_POWER_SIXTEEN;
    let comp_day = (n_three % TWO_POWER_SIXTEEN) / 2141;
    let j = (day_of_year >= 306) as u32;
    let year = (100 * century + year_of_century + j) as i32 - 400 * SHIFT_CONSTANT;
    (year, (comp_month - 12 * j) as u8, (comp_day + 1) as u8)
}

pub const fn clamp_epoch_days(epoch_days: i64) -> i64 {
    if epoch_days > MAX_EPOCH_DAYS {
        MAX_EPOCH_DAYS
    } else if epoch_days < -MAX_EPOCH_DAYS {
        -MAX_EPOCH_DAYS
    } else {
        epoch_days
    }
}

pub const fn epoch_days_for_year(year: i32) -> i64 {
    epoch_days_from_gregorian_date(year, 1, 1)
}

pub const fn epoch_seconds_for_epoch_days(epoch_days: i64) -> i64 {
    epoch_days * SECONDS_PER_DAY
}

pub const fn epoch_seconds_for_year(year: i32) -> i64 {
    epoch_seconds_for_epoch_days(epoch_days_for_year(year))
}

/// Returns the gregorian year containing the epoch seconds.
///
/// The sentinels map onto the edges of the supported range.
pub const fn year_for_epoch_seconds(epoch_seconds: i64) -> i32 {
    ymd_from_epoch_days(epoch_seconds.div_euclid(SECONDS_PER_DAY)).0
}

pub const fn in_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

/// Returns the amount of days in the year preceding `month`.
///
/// `month` is 1 based, with 13 representing the end of the year.
pub const fn month_to_day(month: u8, is_leap: bool) -> i32 {
    let leap_day = if is_leap && month > 2 { 1 } else { 0 };
    let days = match month {
        1 => 0,
        2 => 31,
        3 => 59,
        4 => 90,
        5 => 120,
        6 => 151,
        7 => 181,
        8 => 212,
        9 => 243,
        10 => 273,
        11 => 304,
        12 => 334,
        _ => 365,
    };
    days + leap_day
}

/// Returns the week day for epoch days, where Sunday is `0`.
pub const fn epoch_days_to_week_day(epoch_days: i64) -> u8 {
    // 1970-01-01 was a Thursday
    (epoch_days + 4).rem_euclid(7) as u8
}
