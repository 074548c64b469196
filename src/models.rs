//! Data models for the Medication Administration Record.
//!
//! A [`Form`] is one patient's record for one reporting month. It owns
//! [`LineItem`]s (medication or vital-signs rows), each of which owns up to 31
//! [`AdministrationMark`]s, one per day-of-month. As-needed doses are logged
//! separately as [`PrnRecord`]s and daily measurements as [`VitalSignsReading`]s.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime, Time};

/// Number of day columns on every grid, whatever the month length.
pub const GRID_DAYS: u8 = 31;

/// A reporting month, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReportingMonth {
    year: i32,
    month: Month,
}

impl ReportingMonth {
    pub fn new(year: i32, month: Month) -> Self {
        Self { year, month }
    }

    /// The reporting month a calendar date falls in.
    pub fn of(date: Date) -> Self {
        Self::new(date.year(), date.month())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> Month {
        self.month
    }

    /// The calendar date for a day column, or `None` for dates such as February 30th.
    pub fn date(&self, day: u8) -> Option<Date> {
        Date::from_calendar_date(self.year, self.month, day).ok()
    }

    pub fn contains(&self, date: Date) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl fmt::Display for ReportingMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, u8::from(self.month))
    }
}

impl FromStr for ReportingMonth {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidMonth(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u8>().map_err(|_| invalid())?;
        let month = Month::try_from(month).map_err(|_| invalid())?;
        Ok(Self::new(year, month))
    }
}

/// Parses an ISO `YYYY-MM-DD` date.
pub fn parse_date(input: &str) -> Result<Date, time::error::Parse> {
    Date::parse(input.trim(), format_description!("[year]-[month]-[day]"))
}

/// Parses a nominal administration hour written `HH:MM` or `HHMM`.
pub fn parse_hour(input: &str) -> Option<Time> {
    let input = input.trim();
    let (hour, minute) = match input.split_once(':') {
        Some(parts) => parts,
        None if input.len() == 4 && input.is_ascii() => input.split_at(2),
        None => return None,
    };
    let hour = hour.parse::<u8>().ok()?;
    let minute = minute.parse::<u8>().ok()?;
    Time::from_hms(hour, minute, 0).ok()
}

/// Formats an hour as `HH:MM`.
pub fn format_hour(time: Time) -> String {
    format!("{:02}:{:02}", time.hour(), time.minute())
}

/// Demographic fields copied onto the form when it is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientSnapshot {
    /// Opaque identifier handed over by the page that opened the form.
    pub patient_id: String,
    pub name: String,
    pub record_number: String,
    pub date_of_birth: Option<Date>,
    pub sex: Option<String>,
}

/// Free-text clinical header of a form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClinicalDetails {
    pub diagnosis: Option<String>,
    pub diet: Option<String>,
    pub allergies: Option<String>,
    pub physician: Option<String>,
    pub facility: Option<String>,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    pub id: i64,
    pub patient: PatientSnapshot,
    pub month: ReportingMonth,
    pub details: ClinicalDetails,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewForm {
    pub patient: PatientSnapshot,
    pub month: ReportingMonth,
    pub details: ClinicalDetails,
}

/// Scheduling data of a medication row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicationSchedule {
    pub name: String,
    pub dosage: String,
    pub route: String,
    pub start_date: Date,
    pub stop_date: Option<Date>,
    /// Times per day.
    pub frequency: Option<u8>,
    pub frequency_label: Option<String>,
}

/// A vital-signs row. Active on every day of the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VitalsEntry {
    pub label: String,
    pub instructions: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineItemKind {
    Medication(MedicationSchedule),
    Vitals(VitalsEntry),
}

impl LineItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineItemKind::Medication(_) => "medication",
            LineItemKind::Vitals(_) => "vitals",
        }
    }
}

/// One row of the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub id: i64,
    pub form_id: i64,
    pub kind: LineItemKind,
    pub hour: Option<Time>,
    pub notes: Option<String>,
    /// Monitoring threshold note, e.g. "hold if SBP < 100".
    pub parameter: Option<String>,
    pub display_order: Option<i64>,
}

impl LineItem {
    pub fn is_vitals(&self) -> bool {
        matches!(self.kind, LineItemKind::Vitals(_))
    }

    pub fn medication(&self) -> Option<&MedicationSchedule> {
        match &self.kind {
            LineItemKind::Medication(schedule) => Some(schedule),
            LineItemKind::Vitals(_) => None,
        }
    }

    pub fn display_name(&self) -> String {
        match &self.kind {
            LineItemKind::Medication(m) if m.dosage.is_empty() => m.name.clone(),
            LineItemKind::Medication(m) => format!("{} {}", m.name, m.dosage),
            LineItemKind::Vitals(v) => v.label.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLineItem {
    pub form_id: i64,
    pub kind: LineItemKind,
    pub hour: Option<Time>,
    pub notes: Option<String>,
    pub parameter: Option<String>,
    pub display_order: Option<i64>,
}

/// Partial update of a line-item. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineItemPatch {
    pub hour: Option<Option<Time>>,
    pub notes: Option<Option<String>>,
    pub parameter: Option<Option<String>>,
    pub stop_date: Option<Option<Date>>,
    pub display_order: Option<Option<i64>>,
}

impl LineItemPatch {
    pub fn apply(&self, item: &mut LineItem) {
        if let Some(hour) = self.hour {
            item.hour = hour;
        }
        if let Some(notes) = &self.notes {
            item.notes = notes.clone();
        }
        if let Some(parameter) = &self.parameter {
            item.parameter = parameter.clone();
        }
        if let Some(order) = self.display_order {
            item.display_order = order;
        }
        if let (Some(stop), LineItemKind::Medication(schedule)) = (self.stop_date, &mut item.kind) {
            schedule.stop_date = stop;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkStatus {
    Given,
    NotGiven,
    Prn,
}

impl MarkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkStatus::Given => "given",
            MarkStatus::NotGiven => "not_given",
            MarkStatus::Prn => "prn",
        }
    }
}

impl FromStr for MarkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "given" => Ok(MarkStatus::Given),
            "not_given" => Ok(MarkStatus::NotGiven),
            "prn" => Ok(MarkStatus::Prn),
            other => Err(format!("unknown mark status `{other}`")),
        }
    }
}

/// The stored state of one (line-item, day) cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdministrationMark {
    pub id: i64,
    pub line_item_id: i64,
    pub day: u8,
    pub status: MarkStatus,
    pub initials: String,
    pub note: Option<String>,
    /// Set only for real administrations with status `Given`.
    pub administered_at: Option<OffsetDateTime>,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkDraft {
    pub line_item_id: i64,
    pub day: u8,
    pub status: MarkStatus,
    pub initials: String,
    pub note: Option<String>,
    pub administered_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkPatch {
    pub status: Option<MarkStatus>,
    pub initials: Option<String>,
    pub note: Option<Option<String>>,
    pub administered_at: Option<Option<OffsetDateTime>>,
}

impl MarkPatch {
    pub fn apply(&self, mark: &mut AdministrationMark) {
        if let Some(status) = self.status {
            mark.status = status;
        }
        if let Some(initials) = &self.initials {
            mark.initials = initials.clone();
        }
        if let Some(note) = &self.note {
            mark.note = note.clone();
        }
        if let Some(at) = self.administered_at {
            mark.administered_at = at;
        }
    }
}

/// Fields of a PRN entry, in the order they are filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrnField {
    Date,
    Hour,
    Medication,
    Reason,
    Result,
    Initials,
    StaffSignature,
    Note,
}

impl PrnField {
    pub const ALL: [PrnField; 8] = [
        PrnField::Date,
        PrnField::Hour,
        PrnField::Medication,
        PrnField::Reason,
        PrnField::Result,
        PrnField::Initials,
        PrnField::StaffSignature,
        PrnField::Note,
    ];
}

impl fmt::Display for PrnField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrnField::Date => "date",
            PrnField::Hour => "hour",
            PrnField::Medication => "medication",
            PrnField::Reason => "reason",
            PrnField::Result => "result",
            PrnField::Initials => "initials",
            PrnField::StaffSignature => "staff signature",
            PrnField::Note => "note",
        };
        f.write_str(name)
    }
}

/// A free-standing as-needed dose logged against a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrnRecord {
    pub id: i64,
    pub form_id: i64,
    /// Count of entries at creation time plus one. Never renumbered.
    pub entry_number: i64,
    pub date: Date,
    pub hour: Option<String>,
    pub initials: Option<String>,
    pub medication: String,
    pub reason: String,
    pub result: Option<String>,
    pub staff_signature: Option<String>,
    pub note: Option<String>,
}

impl PrnRecord {
    /// The current text of a field, `None` when blank.
    pub fn value(&self, field: PrnField) -> Option<String> {
        let text = match field {
            PrnField::Date => return Some(self.date.to_string()),
            PrnField::Hour => self.hour.as_deref(),
            PrnField::Medication => Some(self.medication.as_str()),
            PrnField::Reason => Some(self.reason.as_str()),
            PrnField::Result => self.result.as_deref(),
            PrnField::Initials => self.initials.as_deref(),
            PrnField::StaffSignature => self.staff_signature.as_deref(),
            PrnField::Note => self.note.as_deref(),
        };
        text.filter(|t| !t.trim().is_empty()).map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPrnRecord {
    pub form_id: i64,
    pub date: Date,
    pub hour: Option<String>,
    pub initials: Option<String>,
    pub medication: String,
    pub reason: String,
    pub result: Option<String>,
    pub staff_signature: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrnPatch {
    pub date: Option<Date>,
    pub hour: Option<Option<String>>,
    pub initials: Option<Option<String>>,
    pub medication: Option<String>,
    pub reason: Option<String>,
    pub result: Option<Option<String>>,
    pub staff_signature: Option<Option<String>>,
    pub note: Option<Option<String>>,
}

impl PrnPatch {
    pub fn apply(&self, record: &mut PrnRecord) {
        if let Some(date) = self.date {
            record.date = date;
        }
        if let Some(medication) = &self.medication {
            record.medication = medication.clone();
        }
        if let Some(reason) = &self.reason {
            record.reason = reason.clone();
        }
        let optional = [
            (&self.hour, &mut record.hour),
            (&self.initials, &mut record.initials),
            (&self.result, &mut record.result),
            (&self.staff_signature, &mut record.staff_signature),
            (&self.note, &mut record.note),
        ];
        for (patch, target) in optional {
            if let Some(value) = patch {
                *target = value.clone();
            }
        }
    }
}

/// A single measurement column of the vital-signs panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VitalSign {
    Temperature,
    Pulse,
    Respiration,
    Weight,
    Systolic,
    Diastolic,
    BowelMovement,
}

impl VitalSign {
    pub const ALL: [VitalSign; 7] = [
        VitalSign::Temperature,
        VitalSign::Pulse,
        VitalSign::Respiration,
        VitalSign::Weight,
        VitalSign::Systolic,
        VitalSign::Diastolic,
        VitalSign::BowelMovement,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            VitalSign::Temperature => "temperature",
            VitalSign::Pulse => "pulse",
            VitalSign::Respiration => "respiration",
            VitalSign::Weight => "weight",
            VitalSign::Systolic => "systolic pressure",
            VitalSign::Diastolic => "diastolic pressure",
            VitalSign::BowelMovement => "bowel movement",
        }
    }
}

/// Measurements for one day. Each field is independently nullable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VitalSigns {
    pub temperature: Option<f64>,
    pub pulse: Option<i64>,
    pub respiration: Option<i64>,
    pub weight: Option<f64>,
    pub systolic: Option<i64>,
    pub diastolic: Option<i64>,
    pub bowel_movement: Option<String>,
}

impl VitalSigns {
    /// The measurement as it is typed into the vitals dialog.
    pub fn value(&self, sign: VitalSign) -> Option<String> {
        match sign {
            VitalSign::Temperature => self.temperature.map(|v| v.to_string()),
            VitalSign::Pulse => self.pulse.map(|v| v.to_string()),
            VitalSign::Respiration => self.respiration.map(|v| v.to_string()),
            VitalSign::Weight => self.weight.map(|v| v.to_string()),
            VitalSign::Systolic => self.systolic.map(|v| v.to_string()),
            VitalSign::Diastolic => self.diastolic.map(|v| v.to_string()),
            VitalSign::BowelMovement => self.bowel_movement.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        VitalSign::ALL.iter().all(|&sign| self.value(sign).is_none())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VitalSignsReading {
    pub id: i64,
    pub form_id: i64,
    pub day: u8,
    pub values: VitalSigns,
}

/// A (code, description) pair shown in the grid legend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub code: String,
    pub description: String,
}

impl LegendEntry {
    pub fn new(code: &str, description: &str) -> Self {
        Self {
            code: code.to_string(),
            description: description.to_string(),
        }
    }
}

/// A legend code a clinician defined for reuse across forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomLegend {
    pub id: i64,
    pub clinician_id: String,
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLegend {
    pub clinician_id: String,
    pub code: String,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn reporting_month_parses_and_prints() {
        let month: ReportingMonth = "2024-02".parse().unwrap();
        assert_eq!(month, ReportingMonth::new(2024, Month::February));
        assert_eq!(month.to_string(), "2024-02");
        assert!("2024-13".parse::<ReportingMonth>().is_err());
        assert!("24-02".parse::<ReportingMonth>().is_err());
        assert!("February".parse::<ReportingMonth>().is_err());
    }

    #[test]
    fn impossible_dates_have_no_calendar_date() {
        let feb = ReportingMonth::new(2023, Month::February);
        assert_eq!(feb.date(28), Some(date!(2023 - 02 - 28)));
        assert_eq!(feb.date(29), None);
        assert_eq!(feb.date(30), None);
        assert!(feb.contains(date!(2023 - 02 - 01)));
        assert!(!feb.contains(date!(2024 - 02 - 01)));
    }

    #[test]
    fn hours_accept_both_spellings() {
        assert_eq!(parse_hour("08:30"), Time::from_hms(8, 30, 0).ok());
        assert_eq!(parse_hour("2100"), Time::from_hms(21, 0, 0).ok());
        assert_eq!(parse_hour("25:00"), None);
        assert_eq!(parse_hour("noon"), None);
        assert_eq!(format_hour(Time::from_hms(7, 5, 0).unwrap()), "07:05");
    }

    #[test]
    fn prn_patch_only_touches_named_fields() {
        let mut record = PrnRecord {
            id: 1,
            form_id: 1,
            entry_number: 1,
            date: date!(2024 - 03 - 02),
            hour: Some("10:00".into()),
            initials: None,
            medication: "Acetaminophen".into(),
            reason: "Headache".into(),
            result: None,
            staff_signature: None,
            note: Some("with food".into()),
        };
        let patch = PrnPatch {
            result: Some(Some("Relieved".into())),
            note: Some(None),
            ..Default::default()
        };
        patch.apply(&mut record);
        assert_eq!(record.result.as_deref(), Some("Relieved"));
        assert_eq!(record.note, None);
        assert_eq!(record.hour.as_deref(), Some("10:00"));
    }
}
