//! Normative type helpers.
//!
//! Builders for the common `NTScalar` / `NTScalarArray` shapes served by most
//! channels, and a helper to stamp their `timeStamp` field.

use chrono::Utc;

use crate::data::{Member, ScalarKind, Type, TypeCode, TypeDef, Value};
use crate::error::BridgeResult;

/// Type id of a scalar normative type.
pub const NT_SCALAR_ID: &str = "epics:nt/NTScalar:1.0";
/// Type id of a scalar array normative type.
pub const NT_SCALAR_ARRAY_ID: &str = "epics:nt/NTScalarArray:1.0";

fn alarm() -> Member {
    Member::structure(
        "alarm",
        "alarm_t",
        [
            Member::scalar(ScalarKind::Int32, "severity"),
            Member::scalar(ScalarKind::Int32, "status"),
            Member::scalar(ScalarKind::String, "message"),
        ],
    )
}

fn time_stamp() -> Member {
    Member::structure(
        "timeStamp",
        "time_t",
        [
            Member::scalar(ScalarKind::Int64, "secondsPastEpoch"),
            Member::scalar(ScalarKind::Int32, "nanoseconds"),
            Member::scalar(ScalarKind::Int32, "userTag"),
        ],
    )
}

fn display() -> Member {
    Member::structure(
        "display",
        "",
        [
            Member::scalar(ScalarKind::Float64, "limitLow"),
            Member::scalar(ScalarKind::Float64, "limitHigh"),
            Member::scalar(ScalarKind::String, "description"),
            Member::scalar(ScalarKind::String, "units"),
        ],
    )
}

/// `NTScalar` definition.
#[derive(Debug, Clone, Copy)]
pub struct NTScalar {
    kind: ScalarKind,
    display: bool,
}

impl NTScalar {
    /// Scalar of `kind` with alarm and time stamp.
    #[must_use]
    pub const fn new(kind: ScalarKind) -> Self {
        Self { kind, display: false }
    }

    /// Also include display meta-data.
    #[must_use]
    pub const fn with_display(mut self) -> Self {
        self.display = true;
        self
    }

    /// Build the shared type.
    pub fn build(&self) -> BridgeResult<Type> {
        let mut members = vec![Member::scalar(self.kind, "value"), alarm(), time_stamp()];
        if self.display {
            members.push(display());
        }
        TypeDef::structure(NT_SCALAR_ID, members).build()
    }
}

/// `NTScalarArray` definition.
#[derive(Debug, Clone, Copy)]
pub struct NTScalarArray {
    kind: ScalarKind,
}

impl NTScalarArray {
    /// Array of `kind` with alarm and time stamp.
    #[must_use]
    pub const fn new(kind: ScalarKind) -> Self {
        Self { kind }
    }

    /// Build the shared type.
    pub fn build(&self) -> BridgeResult<Type> {
        TypeDef::structure(
            NT_SCALAR_ARRAY_ID,
            [Member::new(TypeCode::ScalarArray(self.kind), "value"), alarm(), time_stamp()],
        )
        .build()
    }
}

/// Set `timeStamp.secondsPastEpoch` and `timeStamp.nanoseconds` to now.
pub fn stamp_now(value: &mut Value) -> BridgeResult<()> {
    let now = Utc::now();
    value.set("timeStamp.secondsPastEpoch", now.timestamp())?;
    value.set("timeStamp.nanoseconds", i64::from(now.timestamp_subsec_nanos()))?;
    Ok(())
}
