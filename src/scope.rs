//! Role-scoped lookups and the appointment list filter.
//!
//! The appointment endpoints never take a patient or doctor id from the client to decide
//! whose data is visible. Instead the caller says which of their own profiles they act as
//! (`me=patient` / `me=doctor`) and the profile is resolved from their user id.

use std::str::FromStr;

use chrono::{
    DateTime, Days, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::ApiError,
    models::{Doctor, Patient},
    repository::Repository,
};

/// ActingAs
///
/// The profile a caller acts through, as named by the `me` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActingAs {
    Patient,
    Doctor,
}

impl FromStr for ActingAs {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(ActingAs::Patient),
            "doctor" => Ok(ActingAs::Doctor),
            _ => Err(invalid_me()),
        }
    }
}

fn invalid_me() -> ApiError {
    ApiError::bad_request("Missing or invalid 'me' parameter. Must be 'patient' or 'doctor'")
}

/// Profile
///
/// A resolved role-specific profile row.
#[derive(Debug, Clone, PartialEq)]
pub enum Profile {
    Patient(Patient),
    Doctor(Doctor),
}

/// resolve_profile
///
/// Finds the profile row owned by `user_id` for the given role. A missing row is a 404,
/// distinct from the 400 of an invalid `me` value and the 403 of a role mismatch.
pub async fn resolve_profile(
    repo: &dyn Repository,
    user_id: Uuid,
    acting_as: ActingAs,
) -> Result<Profile, ApiError> {
    match acting_as {
        ActingAs::Patient => repo
            .get_patient_by_user(user_id)
            .await?
            .map(Profile::Patient)
            .ok_or_else(|| ApiError::not_found("Patient profile not found")),
        ActingAs::Doctor => repo
            .get_doctor_by_user(user_id)
            .await?
            .map(Profile::Doctor)
            .ok_or_else(|| ApiError::not_found("Doctor profile not found")),
    }
}

/// AppointmentFilter
///
/// Predicate for listing appointments. All present constraints are ANDed; an empty filter
/// matches every appointment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppointmentFilter {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    /// Half-open `[from, until)` window on the appointment date.
    pub window: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl AppointmentFilter {
    fn scoped_to(profile: Profile) -> Self {
        match profile {
            Profile::Patient(patient) => Self {
                patient_id: Some(patient.id),
                ..Self::default()
            },
            Profile::Doctor(doctor) => Self {
                doctor_id: Some(doctor.id),
                ..Self::default()
            },
        }
    }
}

/// build_appointment_filter
///
/// Turns the caller and the raw `me`/`date` query values into a filter.
///
/// - Non-admins must pass a valid `me` (400 otherwise) that resolves to one of their own
///   profiles (404 otherwise).
/// - Admins are scoped only by `me=patient` or `me=doctor` (404 without that profile).
///   Any other `me`, including none or an empty one, lists every appointment.
/// - `date=today` restricts to the current local calendar day. Other values are ignored.
pub async fn build_appointment_filter<Tz: TimeZone>(
    repo: &dyn Repository,
    caller: &AuthUser,
    me: Option<&str>,
    date: Option<&str>,
    now: DateTime<Tz>,
) -> Result<AppointmentFilter, ApiError> {
    let acting_as = if caller.is_admin() {
        me.and_then(|me| me.parse::<ActingAs>().ok())
    } else {
        Some(me.ok_or_else(invalid_me)?.parse::<ActingAs>()?)
    };

    let mut filter = match acting_as {
        Some(acting_as) => {
            AppointmentFilter::scoped_to(resolve_profile(repo, caller.id, acting_as).await?)
        }
        None => AppointmentFilter::default(),
    };

    if date == Some("today") {
        filter.window = Some(day_window(&now).ok_or_else(|| {
            ApiError::internal("current day has no representable local midnight")
        })?);
    }

    Ok(filter)
}

/// day_window
///
/// `[midnight today, midnight tomorrow)` in the time zone of `now`, converted to UTC.
/// On a DST transition the earliest valid instant at or after midnight is used.
pub fn day_window<Tz: TimeZone>(now: &DateTime<Tz>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let tz = now.timezone();
    let today = now.date_naive();
    let tomorrow = today.checked_add_days(Days::new(1))?;
    Some((
        local_midnight(&tz, today)?,
        local_midnight(&tz, tomorrow)?,
    ))
}

fn local_midnight<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> Option<DateTime<Utc>> {
    // Some zones skip midnight on DST start; step forward to the first hour that exists.
    (0..24u32).find_map(|hour| {
        let time = NaiveTime::from_hms_opt(hour, 0, 0)?;
        tz.from_local_datetime(&day.and_time(time))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

/// parse_appointment_date
///
/// Accepts, in order:
/// - RFC 3339 with an offset (`2025-03-01T09:30:00Z`, `2025-03-01T09:30:00+02:00`);
/// - a local date-time without offset (`2025-03-01T09:30`, seconds and fractions optional),
///   read in server-local time;
/// - a bare date (`2025-03-01`), read as UTC midnight.
pub fn parse_appointment_date(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    parse_date_in(raw, &Local)
}

/// Same as `parse_appointment_date` with an explicit zone for offset-less date-times.
pub fn parse_date_in<Tz: TimeZone>(raw: &str, local: &Tz) -> Result<DateTime<Utc>, ApiError> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    const LOCAL_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];
    for format in LOCAL_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(invalid_date);
        }
    }

    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(day.and_time(NaiveTime::MIN).and_utc());
    }

    Err(invalid_date())
}

fn invalid_date() -> ApiError {
    ApiError::bad_request("Invalid date format")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Timelike};

    #[test]
    fn day_window_covers_the_calendar_day() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 15, 45, 0).unwrap();
        let (from, until) = day_window(&now).unwrap();
        assert_eq!(from, Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap());
        assert_eq!(until, Utc.with_ymd_and_hms(2025, 3, 11, 0, 0, 0).unwrap());
    }

    #[test]
    fn day_window_respects_the_local_offset() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2025, 3, 10, 0, 30, 0).unwrap();
        let (from, until) = day_window(&now).unwrap();
        // Local midnight at +02:00 is 22:00 UTC of the previous day.
        assert_eq!(from, Utc.with_ymd_and_hms(2025, 3, 9, 22, 0, 0).unwrap());
        assert_eq!(until, Utc.with_ymd_and_hms(2025, 3, 10, 22, 0, 0).unwrap());
    }

    #[test]
    fn day_window_boundaries_are_half_open() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let (from, until) = day_window(&now).unwrap();
        let inside = |t: DateTime<Utc>| from <= t && t < until;

        assert!(inside(Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()));
        assert!(inside(Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap()));
        assert!(!inside(Utc.with_ymd_and_hms(2025, 3, 9, 23, 59, 0).unwrap()));
        assert!(!inside(Utc.with_ymd_and_hms(2025, 3, 11, 0, 0, 0).unwrap()));
    }

    #[test]
    fn rfc3339_dates_keep_their_offset() {
        let parsed = parse_date_in("2025-03-01T09:30:00+02:00", &Utc).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 3, 1, 7, 30, 0).unwrap());

        let zulu = parse_date_in("2025-03-01T09:30:00.000Z", &Utc).unwrap();
        assert_eq!(zulu.hour(), 9);
    }

    #[test]
    fn offsetless_date_times_use_the_local_zone() {
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        let parsed = parse_date_in("2025-03-01T09:30", &tz).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 3, 1, 14, 30, 0).unwrap());

        let with_seconds = parse_date_in("2025-03-01T09:30:15", &tz).unwrap();
        assert_eq!(with_seconds.second(), 15);
    }

    #[test]
    fn bare_dates_are_utc_midnight() {
        let parsed = parse_date_in("2025-03-01", &FixedOffset::east_opt(3600).unwrap()).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn unparsable_dates_are_bad_requests() {
        for raw in ["", "tomorrow", "2025-13-01", "01/03/2025", "2025-02-30T10:00"] {
            let err = parse_date_in(raw, &Utc).unwrap_err();
            assert!(
                matches!(&err, ApiError::BadRequest(msg) if msg == "Invalid date format"),
                "{raw:?} produced {err:?}"
            );
        }
    }

    #[test]
    fn acting_as_accepts_only_the_two_lowercase_roles() {
        assert_eq!("patient".parse::<ActingAs>().unwrap(), ActingAs::Patient);
        assert_eq!("doctor".parse::<ActingAs>().unwrap(), ActingAs::Doctor);
        assert!("PATIENT".parse::<ActingAs>().is_err());
        assert!("true".parse::<ActingAs>().is_err());
        assert!("admin".parse::<ActingAs>().is_err());
    }
}
