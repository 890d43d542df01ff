use chrono::{DateTime, NaiveDateTime, Utc};

use crate::limits::*;
use crate::model::*;

use super::AllocError;

/// Accept RFC 3339, or a bare `YYYY-MM-DDTHH:MM:SS` taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<Ts> {
    if let Ok(at) = DateTime::parse_from_rfc3339(s) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

impl ScheduleRequest {
    /// Build a request from the inbound call contract: a class token
    /// (`p1`..`r3`) or a timestamp, plus batch parameters for `r*` tokens.
    pub fn parse(
        token: &str,
        base_time: Ts,
        count: Option<u32>,
        weeks_between: Option<u32>,
    ) -> Result<Self, AllocError> {
        let target = match token.parse::<PriorityClass>() {
            Ok(class) => ScheduleTarget::Class(class),
            Err(_) => match parse_timestamp(token) {
                Some(at) => ScheduleTarget::Explicit(at),
                None => {
                    return Err(AllocError::InvalidRequest(format!(
                        "unknown priority token: {token}"
                    )));
                }
            },
        };
        let batch = match (count, weeks_between) {
            (None, None) => None,
            (Some(count), Some(weeks_between)) => Some(BatchSpec {
                count,
                weeks_between,
            }),
            _ => {
                return Err(AllocError::InvalidRequest(
                    "count and weeks_between must be given together".into(),
                ));
            }
        };
        let request = Self {
            target,
            base_time,
            batch,
        };
        request.validate()?;
        Ok(request)
    }

    /// Batch parameters are required for repurpose tiers and rejected otherwise.
    pub fn validate(&self) -> Result<(), AllocError> {
        match (self.target, self.batch) {
            (ScheduleTarget::Class(class), Some(batch)) if class.is_repurpose() => {
                if batch.count == 0 {
                    return Err(AllocError::InvalidRequest("count must be positive".into()));
                }
                if batch.weeks_between == 0 {
                    return Err(AllocError::InvalidRequest(
                        "weeks_between must be positive".into(),
                    ));
                }
                if batch.count > MAX_BATCH_COUNT {
                    return Err(AllocError::LimitExceeded("batch count too large"));
                }
                if batch.weeks_between > MAX_WEEKS_BETWEEN {
                    return Err(AllocError::LimitExceeded("weeks_between too large"));
                }
                Ok(())
            }
            (ScheduleTarget::Class(class), None) if class.is_repurpose() => Err(
                AllocError::InvalidRequest(format!("{class} requires count and weeks_between")),
            ),
            (ScheduleTarget::Class(class), Some(_)) => Err(AllocError::InvalidRequest(format!(
                "{class} does not take count or weeks_between"
            ))),
            (ScheduleTarget::Explicit(_), Some(_)) => Err(AllocError::InvalidRequest(
                "explicit timestamps do not take count or weeks_between".into(),
            )),
            (ScheduleTarget::Class(_), None) | (ScheduleTarget::Explicit(_), None) => Ok(()),
        }
    }
}
