use super::{OnConflict, RecordStore};
use crate::error::StoreError;
use crate::models::{
    format_hour, parse_date, parse_hour, AdministrationMark, ClinicalDetails, CustomLegend, Form,
    LineItem, LineItemKind, LineItemPatch, MarkDraft, MarkPatch, MarkStatus, MedicationSchedule,
    NewForm, NewLegend, NewLineItem, NewPrnRecord, PatientSnapshot, PrnPatch, PrnRecord,
    ReportingMonth, VitalSigns, VitalSignsReading, VitalsEntry,
};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Params, Row};
use std::path::Path;
use time::{Date, OffsetDateTime, Time};
use tracing::{debug, info};

const SCHEMA: &str = include_str!("schema.sql");

const FORM_COLUMNS: &str = "id, patient_id, patient_name, record_number, date_of_birth, sex, \
     month, diagnosis, diet, allergies, physician, facility, comments, created_at";

const LINE_ITEM_COLUMNS: &str = "id, form_id, kind, name, dosage, route, start_date, stop_date, \
     hour, notes, parameter, frequency, frequency_label, display_order";

const MARK_COLUMNS: &str =
    "id, line_item_id, day, status, initials, note, administered_at, updated_at";

const PRN_COLUMNS: &str = "id, form_id, entry_number, date, hour, initials, medication, reason, \
     result, staff_signature, note";

const VITALS_COLUMNS: &str = "id, form_id, day, temperature, pulse, respiration, weight, \
     systolic, diastolic, bowel_movement";

const LEGEND_COLUMNS: &str = "id, clinician_id, code, description";

/// A [`RecordStore`] backed by a single SQLite connection.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) the database file and applies the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot be executed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let store = Self::init(Connection::open(path)?)?;
        info!(path = %path.display(), "opened record store");
        Ok(store)
    }

    /// Opens a private in-memory database. Used by tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    fn query_all<T, P: Params>(
        &self,
        sql: &str,
        params: P,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, map)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_mark(&self, id: i64) -> Result<AdministrationMark, StoreError> {
        self.conn
            .query_row(
                &format!("SELECT {MARK_COLUMNS} FROM administration_marks WHERE id = ?1"),
                params![id],
                mark_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound { entity: "mark", id })
    }
}

fn not_found(entity: &'static str, id: i64, affected: usize) -> Result<(), StoreError> {
    if affected == 0 {
        Err(StoreError::NotFound { entity, id })
    } else {
        Ok(())
    }
}

fn conversion_error<E>(idx: usize, ty: Type, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

fn date_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Date> {
    let text: String = row.get(idx)?;
    parse_date(&text).map_err(|e| conversion_error(idx, Type::Text, e))
}

fn optional_date_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Date>> {
    row.get::<_, Option<String>>(idx)?
        .map(|text| parse_date(&text).map_err(|e| conversion_error(idx, Type::Text, e)))
        .transpose()
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let secs: i64 = row.get(idx)?;
    OffsetDateTime::from_unix_timestamp(secs).map_err(|e| conversion_error(idx, Type::Integer, e))
}

fn optional_timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<OffsetDateTime>> {
    row.get::<_, Option<i64>>(idx)?
        .map(|secs| {
            OffsetDateTime::from_unix_timestamp(secs)
                .map_err(|e| conversion_error(idx, Type::Integer, e))
        })
        .transpose()
}

fn hour_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Time>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(text) => parse_hour(&text).map(Some).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(idx, format!("Invalid hour: {text}"), Type::Text)
        }),
    }
}

fn form_from_row(row: &Row<'_>) -> rusqlite::Result<Form> {
    let month: String = row.get(6)?;
    let month = month
        .parse::<ReportingMonth>()
        .map_err(|e| conversion_error(6, Type::Text, e))?;
    Ok(Form {
        id: row.get(0)?,
        patient: PatientSnapshot {
            patient_id: row.get(1)?,
            name: row.get(2)?,
            record_number: row.get(3)?,
            date_of_birth: optional_date_at(row, 4)?,
            sex: row.get(5)?,
        },
        month,
        details: ClinicalDetails {
            diagnosis: row.get(7)?,
            diet: row.get(8)?,
            allergies: row.get(9)?,
            physician: row.get(10)?,
            facility: row.get(11)?,
            comments: row.get(12)?,
        },
        created_at: timestamp_at(row, 13)?,
    })
}

fn line_item_from_row(row: &Row<'_>) -> rusqlite::Result<LineItem> {
    let kind = match row.get::<_, String>(2)?.as_str() {
        "medication" => LineItemKind::Medication(MedicationSchedule {
            name: row.get(3)?,
            dosage: row.get(4)?,
            route: row.get(5)?,
            start_date: date_at(row, 6)?,
            stop_date: optional_date_at(row, 7)?,
            frequency: row.get(11)?,
            frequency_label: row.get(12)?,
        }),
        "vitals" => LineItemKind::Vitals(VitalsEntry {
            label: row.get(3)?,
            instructions: row.get(4)?,
        }),
        other => {
            return Err(rusqlite::Error::InvalidColumnType(
                2,
                format!("Invalid line item kind: {other}"),
                Type::Text,
            ))
        }
    };
    Ok(LineItem {
        id: row.get(0)?,
        form_id: row.get(1)?,
        kind,
        hour: hour_at(row, 8)?,
        notes: row.get(9)?,
        parameter: row.get(10)?,
        display_order: row.get(13)?,
    })
}

fn mark_from_row(row: &Row<'_>) -> rusqlite::Result<AdministrationMark> {
    let status = row
        .get::<_, String>(3)?
        .parse::<MarkStatus>()
        .map_err(|e| rusqlite::Error::InvalidColumnType(3, e, Type::Text))?;
    Ok(AdministrationMark {
        id: row.get(0)?,
        line_item_id: row.get(1)?,
        day: row.get(2)?,
        status,
        initials: row.get(4)?,
        note: row.get(5)?,
        administered_at: optional_timestamp_at(row, 6)?,
        updated_at: timestamp_at(row, 7)?,
    })
}

fn prn_from_row(row: &Row<'_>) -> rusqlite::Result<PrnRecord> {
    Ok(PrnRecord {
        id: row.get(0)?,
        form_id: row.get(1)?,
        entry_number: row.get(2)?,
        date: date_at(row, 3)?,
        hour: row.get(4)?,
        initials: row.get(5)?,
        medication: row.get(6)?,
        reason: row.get(7)?,
        result: row.get(8)?,
        staff_signature: row.get(9)?,
        note: row.get(10)?,
    })
}

fn vitals_from_row(row: &Row<'_>) -> rusqlite::Result<VitalSignsReading> {
    Ok(VitalSignsReading {
        id: row.get(0)?,
        form_id: row.get(1)?,
        day: row.get(2)?,
        values: VitalSigns {
            temperature: row.get(3)?,
            pulse: row.get(4)?,
            respiration: row.get(5)?,
            weight: row.get(6)?,
            systolic: row.get(7)?,
            diastolic: row.get(8)?,
            bowel_movement: row.get(9)?,
        },
    })
}

fn legend_from_row(row: &Row<'_>) -> rusqlite::Result<CustomLegend> {
    Ok(CustomLegend {
        id: row.get(0)?,
        clinician_id: row.get(1)?,
        code: row.get(2)?,
        description: row.get(3)?,
    })
}

/// Column values of the type-specific part of a line-item.
struct KindColumns<'a> {
    kind: &'static str,
    name: &'a str,
    dosage: &'a str,
    route: &'a str,
    start_date: Option<String>,
    stop_date: Option<String>,
    frequency: Option<u8>,
    frequency_label: Option<&'a str>,
}

impl<'a> KindColumns<'a> {
    fn of(kind: &'a LineItemKind) -> Self {
        match kind {
            LineItemKind::Medication(m) => Self {
                kind: kind.as_str(),
                name: &m.name,
                dosage: &m.dosage,
                route: &m.route,
                start_date: Some(m.start_date.to_string()),
                stop_date: m.stop_date.map(|d| d.to_string()),
                frequency: m.frequency,
                frequency_label: m.frequency_label.as_deref(),
            },
            LineItemKind::Vitals(v) => Self {
                kind: kind.as_str(),
                name: &v.label,
                dosage: &v.instructions,
                route: "",
                start_date: None,
                stop_date: None,
                frequency: None,
                frequency_label: None,
            },
        }
    }
}

fn insert_line_item_on(conn: &Connection, item: &NewLineItem) -> Result<LineItem, StoreError> {
    let c = KindColumns::of(&item.kind);
    let row = conn.query_row(
        &format!(
            "INSERT INTO line_items (form_id, kind, name, dosage, route, start_date, stop_date, \
             hour, notes, parameter, frequency, frequency_label, display_order) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13) \
             RETURNING {LINE_ITEM_COLUMNS}"
        ),
        params![
            item.form_id,
            c.kind,
            c.name,
            c.dosage,
            c.route,
            c.start_date,
            c.stop_date,
            item.hour.map(format_hour),
            item.notes,
            item.parameter,
            c.frequency,
            c.frequency_label,
            item.display_order,
        ],
        line_item_from_row,
    )?;
    Ok(row)
}

impl RecordStore for SqliteStore {
    fn insert_form(&self, form: &NewForm) -> Result<Form, StoreError> {
        let row = self.conn.query_row(
            &format!(
                "INSERT INTO forms (patient_id, patient_name, record_number, date_of_birth, sex, \
                 month, diagnosis, diet, allergies, physician, facility, comments, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13) \
                 RETURNING {FORM_COLUMNS}"
            ),
            params![
                form.patient.patient_id,
                form.patient.name,
                form.patient.record_number,
                form.patient.date_of_birth.map(|d| d.to_string()),
                form.patient.sex,
                form.month.to_string(),
                form.details.diagnosis,
                form.details.diet,
                form.details.allergies,
                form.details.physician,
                form.details.facility,
                form.details.comments,
                OffsetDateTime::now_utc().unix_timestamp(),
            ],
            form_from_row,
        )?;
        debug!(form_id = row.id, month = %row.month, "inserted form");
        Ok(row)
    }

    fn get_form(&self, id: i64) -> Result<Form, StoreError> {
        self.conn
            .query_row(
                &format!("SELECT {FORM_COLUMNS} FROM forms WHERE id = ?1"),
                params![id],
                form_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound { entity: "form", id })
    }

    fn update_form(&self, id: i64, details: &ClinicalDetails) -> Result<Form, StoreError> {
        let affected = self.conn.execute(
            "UPDATE forms SET diagnosis = ?2, diet = ?3, allergies = ?4, physician = ?5, \
             facility = ?6, comments = ?7 WHERE id = ?1",
            params![
                id,
                details.diagnosis,
                details.diet,
                details.allergies,
                details.physician,
                details.facility,
                details.comments,
            ],
        )?;
        not_found("form", id, affected)?;
        self.get_form(id)
    }

    fn list_forms(&self) -> Result<Vec<Form>, StoreError> {
        self.query_all(
            &format!("SELECT {FORM_COLUMNS} FROM forms ORDER BY month DESC, patient_name, id"),
            [],
            form_from_row,
        )
    }

    fn forms_for_patient_month(
        &self,
        patient_id: &str,
        month: ReportingMonth,
    ) -> Result<Vec<Form>, StoreError> {
        self.query_all(
            &format!(
                "SELECT {FORM_COLUMNS} FROM forms WHERE patient_id = ?1 AND month = ?2 ORDER BY id"
            ),
            params![patient_id, month.to_string()],
            form_from_row,
        )
    }

    fn delete_form(&self, id: i64) -> Result<(), StoreError> {
        let affected = self
            .conn
            .execute("DELETE FROM forms WHERE id = ?1", params![id])?;
        not_found("form", id, affected)
    }

    fn insert_line_item(&self, item: &NewLineItem) -> Result<LineItem, StoreError> {
        insert_line_item_on(&self.conn, item)
    }

    fn insert_line_items(&self, items: &[NewLineItem]) -> Result<Vec<LineItem>, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            rows.push(insert_line_item_on(&tx, item)?);
        }
        tx.commit()?;
        Ok(rows)
    }

    fn get_line_item(&self, id: i64) -> Result<LineItem, StoreError> {
        self.conn
            .query_row(
                &format!("SELECT {LINE_ITEM_COLUMNS} FROM line_items WHERE id = ?1"),
                params![id],
                line_item_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound {
                entity: "line item",
                id,
            })
    }

    fn line_items_for_form(&self, form_id: i64) -> Result<Vec<LineItem>, StoreError> {
        self.query_all(
            &format!(
                "SELECT {LINE_ITEM_COLUMNS} FROM line_items WHERE form_id = ?1 \
                 ORDER BY display_order IS NULL, display_order, id"
            ),
            params![form_id],
            line_item_from_row,
        )
    }

    fn update_line_item(&self, id: i64, patch: &LineItemPatch) -> Result<LineItem, StoreError> {
        let mut item = self.get_line_item(id)?;
        patch.apply(&mut item);
        let c = KindColumns::of(&item.kind);
        self.conn.execute(
            "UPDATE line_items SET name = ?2, dosage = ?3, route = ?4, start_date = ?5, \
             stop_date = ?6, hour = ?7, notes = ?8, parameter = ?9, frequency = ?10, \
             frequency_label = ?11, display_order = ?12 WHERE id = ?1",
            params![
                id,
                c.name,
                c.dosage,
                c.route,
                c.start_date,
                c.stop_date,
                item.hour.map(format_hour),
                item.notes,
                item.parameter,
                c.frequency,
                c.frequency_label,
                item.display_order,
            ],
        )?;
        Ok(item)
    }

    fn set_display_orders(&self, keys: &[(i64, i64)]) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare("UPDATE line_items SET display_order = ?2 WHERE id = ?1")?;
            for (id, key) in keys {
                let affected = stmt.execute(params![id, key])?;
                not_found("line item", *id, affected)?;
            }
        }
        tx.commit()?;
        debug!(count = keys.len(), "wrote display order keys");
        Ok(())
    }

    fn delete_line_item(&self, id: i64) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let marks = self.delete_marks_for_line_item(id)?;
        let affected = tx.execute("DELETE FROM line_items WHERE id = ?1", params![id])?;
        not_found("line item", id, affected)?;
        tx.commit()?;
        debug!(line_item_id = id, marks, "deleted line item");
        Ok(())
    }

    fn marks_for_line_item(
        &self,
        line_item_id: i64,
    ) -> Result<Vec<AdministrationMark>, StoreError> {
        self.query_all(
            &format!(
                "SELECT {MARK_COLUMNS} FROM administration_marks WHERE line_item_id = ?1 \
                 ORDER BY day"
            ),
            params![line_item_id],
            mark_from_row,
        )
    }

    fn marks_for_line_items(&self, ids: &[i64]) -> Result<Vec<AdministrationMark>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        self.query_all(
            &format!(
                "SELECT {MARK_COLUMNS} FROM administration_marks \
                 WHERE line_item_id IN ({placeholders}) ORDER BY line_item_id, day"
            ),
            params_from_iter(ids.iter()),
            mark_from_row,
        )
    }

    fn marks_for_form(&self, form_id: i64) -> Result<Vec<AdministrationMark>, StoreError> {
        self.query_all(
            "SELECT m.id, m.line_item_id, m.day, m.status, m.initials, m.note, \
             m.administered_at, m.updated_at \
             FROM administration_marks m JOIN line_items l ON l.id = m.line_item_id \
             WHERE l.form_id = ?1 ORDER BY m.line_item_id, m.day",
            params![form_id],
            mark_from_row,
        )
    }

    fn mark_for_cell(
        &self,
        line_item_id: i64,
        day: u8,
    ) -> Result<Option<AdministrationMark>, StoreError> {
        let mark = self
            .conn
            .query_row(
                &format!(
                    "SELECT {MARK_COLUMNS} FROM administration_marks \
                     WHERE line_item_id = ?1 AND day = ?2"
                ),
                params![line_item_id, day],
                mark_from_row,
            )
            .optional()?;
        Ok(mark)
    }

    fn update_mark(&self, id: i64, patch: &MarkPatch) -> Result<AdministrationMark, StoreError> {
        let mut mark = self.get_mark(id)?;
        patch.apply(&mut mark);
        mark.updated_at = OffsetDateTime::now_utc();
        self.conn.execute(
            "UPDATE administration_marks SET status = ?2, initials = ?3, note = ?4, \
             administered_at = ?5, updated_at = ?6 WHERE id = ?1",
            params![
                id,
                mark.status.as_str(),
                mark.initials,
                mark.note,
                mark.administered_at.map(|t| t.unix_timestamp()),
                mark.updated_at.unix_timestamp(),
            ],
        )?;
        // Round-trip through the column encoding so callers see what was stored.
        self.get_mark(id)
    }

    fn upsert_marks(
        &self,
        drafts: &[MarkDraft],
        on_conflict: OnConflict,
    ) -> Result<Vec<AdministrationMark>, StoreError> {
        let conflict_clause = match on_conflict {
            OnConflict::Overwrite => {
                "ON CONFLICT (line_item_id, day) DO UPDATE SET status = excluded.status, \
                 initials = excluded.initials, note = excluded.note, \
                 administered_at = excluded.administered_at, updated_at = excluded.updated_at"
            }
            OnConflict::Reject => "",
        };
        let sql = format!(
            "INSERT INTO administration_marks (line_item_id, day, status, initials, note, \
             administered_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             {conflict_clause} RETURNING {MARK_COLUMNS}"
        );
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let tx = self.conn.unchecked_transaction()?;
        let mut rows = Vec::with_capacity(drafts.len());
        {
            let mut stmt = tx.prepare(&sql)?;
            for draft in drafts {
                let row = stmt.query_row(
                    params![
                        draft.line_item_id,
                        draft.day,
                        draft.status.as_str(),
                        draft.initials,
                        draft.note,
                        draft.administered_at.map(|t| t.unix_timestamp()),
                        now,
                    ],
                    mark_from_row,
                )?;
                rows.push(row);
            }
        }
        tx.commit()?;
        Ok(rows)
    }

    fn delete_mark(&self, id: i64) -> Result<(), StoreError> {
        let affected = self
            .conn
            .execute("DELETE FROM administration_marks WHERE id = ?1", params![id])?;
        not_found("mark", id, affected)
    }

    fn delete_marks_for_line_item(&self, line_item_id: i64) -> Result<usize, StoreError> {
        let affected = self.conn.execute(
            "DELETE FROM administration_marks WHERE line_item_id = ?1",
            params![line_item_id],
        )?;
        Ok(affected)
    }

    fn prn_records_for_form(&self, form_id: i64) -> Result<Vec<PrnRecord>, StoreError> {
        self.query_all(
            &format!(
                "SELECT {PRN_COLUMNS} FROM prn_records WHERE form_id = ?1 \
                 ORDER BY entry_number, id"
            ),
            params![form_id],
            prn_from_row,
        )
    }

    fn get_prn_record(&self, id: i64) -> Result<PrnRecord, StoreError> {
        self.conn
            .query_row(
                &format!("SELECT {PRN_COLUMNS} FROM prn_records WHERE id = ?1"),
                params![id],
                prn_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound {
                entity: "PRN record",
                id,
            })
    }

    fn insert_prn_record(&self, record: &NewPrnRecord) -> Result<PrnRecord, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        // Count + 1, but never below an existing number once entries were deleted.
        let entry_number: i64 = tx.query_row(
            "SELECT MAX(COUNT(*), COALESCE(MAX(entry_number), 0)) + 1 \
             FROM prn_records WHERE form_id = ?1",
            params![record.form_id],
            |row| row.get(0),
        )?;
        let row = tx.query_row(
            &format!(
                "INSERT INTO prn_records (form_id, entry_number, date, hour, initials, \
                 medication, reason, result, staff_signature, note) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) RETURNING {PRN_COLUMNS}"
            ),
            params![
                record.form_id,
                entry_number,
                record.date.to_string(),
                record.hour,
                record.initials,
                record.medication,
                record.reason,
                record.result,
                record.staff_signature,
                record.note,
            ],
            prn_from_row,
        )?;
        tx.commit()?;
        Ok(row)
    }

    fn update_prn_record(&self, id: i64, patch: &PrnPatch) -> Result<PrnRecord, StoreError> {
        let mut record = self.get_prn_record(id)?;
        patch.apply(&mut record);
        self.conn.execute(
            "UPDATE prn_records SET date = ?2, hour = ?3, initials = ?4, medication = ?5, \
             reason = ?6, result = ?7, staff_signature = ?8, note = ?9 WHERE id = ?1",
            params![
                id,
                record.date.to_string(),
                record.hour,
                record.initials,
                record.medication,
                record.reason,
                record.result,
                record.staff_signature,
                record.note,
            ],
        )?;
        Ok(record)
    }

    fn delete_prn_record(&self, id: i64) -> Result<(), StoreError> {
        let affected = self
            .conn
            .execute("DELETE FROM prn_records WHERE id = ?1", params![id])?;
        not_found("PRN record", id, affected)
    }

    fn vitals_for_form(&self, form_id: i64) -> Result<Vec<VitalSignsReading>, StoreError> {
        self.query_all(
            &format!("SELECT {VITALS_COLUMNS} FROM vital_signs WHERE form_id = ?1 ORDER BY day"),
            params![form_id],
            vitals_from_row,
        )
    }

    fn vitals_for_day(
        &self,
        form_id: i64,
        day: u8,
    ) -> Result<Option<VitalSignsReading>, StoreError> {
        let reading = self
            .conn
            .query_row(
                &format!(
                    "SELECT {VITALS_COLUMNS} FROM vital_signs WHERE form_id = ?1 AND day = ?2"
                ),
                params![form_id, day],
                vitals_from_row,
            )
            .optional()?;
        Ok(reading)
    }

    fn upsert_vitals_reading(
        &self,
        form_id: i64,
        day: u8,
        values: &VitalSigns,
    ) -> Result<VitalSignsReading, StoreError> {
        let row = self.conn.query_row(
            &format!(
                "INSERT INTO vital_signs (form_id, day, temperature, pulse, respiration, weight, \
                 systolic, diastolic, bowel_movement) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                 ON CONFLICT (form_id, day) DO UPDATE SET temperature = excluded.temperature, \
                 pulse = excluded.pulse, respiration = excluded.respiration, \
                 weight = excluded.weight, systolic = excluded.systolic, \
                 diastolic = excluded.diastolic, bowel_movement = excluded.bowel_movement \
                 RETURNING {VITALS_COLUMNS}"
            ),
            params![
                form_id,
                day,
                values.temperature,
                values.pulse,
                values.respiration,
                values.weight,
                values.systolic,
                values.diastolic,
                values.bowel_movement,
            ],
            vitals_from_row,
        )?;
        Ok(row)
    }

    fn legends_for_clinician(&self, clinician_id: &str) -> Result<Vec<CustomLegend>, StoreError> {
        self.query_all(
            &format!(
                "SELECT {LEGEND_COLUMNS} FROM custom_legends WHERE clinician_id = ?1 ORDER BY code"
            ),
            params![clinician_id],
            legend_from_row,
        )
    }

    fn insert_legend(&self, legend: &NewLegend) -> Result<CustomLegend, StoreError> {
        let row = self.conn.query_row(
            &format!(
                "INSERT INTO custom_legends (clinician_id, code, description) VALUES (?1, ?2, ?3) \
                 RETURNING {LEGEND_COLUMNS}"
            ),
            params![legend.clinician_id, legend.code, legend.description],
            legend_from_row,
        )?;
        Ok(row)
    }

    fn delete_legend(&self, id: i64) -> Result<(), StoreError> {
        let affected = self
            .conn
            .execute("DELETE FROM custom_legends WHERE id = ?1", params![id])?;
        not_found("legend", id, affected)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use time::macros::date;

    fn draft(line_item_id: i64, day: u8, initials: &str) -> MarkDraft {
        MarkDraft {
            line_item_id,
            day,
            status: MarkStatus::Given,
            initials: initials.to_string(),
            note: None,
            administered_at: Some(OffsetDateTime::now_utc()),
        }
    }

    #[test]
    fn form_round_trips_through_the_store() {
        let store = store();
        let mut new = new_form("patient-9", march());
        new.patient.date_of_birth = Some(date!(1950 - 07 - 14));
        new.details.allergies = Some("Penicillin".into());
        let form = store.insert_form(&new).unwrap();

        let loaded = store.get_form(form.id).unwrap();
        assert_eq!(loaded.patient, new.patient);
        assert_eq!(loaded.month, march());
        assert_eq!(loaded.details.allergies.as_deref(), Some("Penicillin"));
    }

    #[test]
    fn duplicate_forms_are_stored_not_rejected() {
        let store = store();
        form(&store);
        form(&store);
        let found = store.forms_for_patient_month("patient-1", march()).unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn missing_rows_report_not_found() {
        let store = store();
        assert!(matches!(
            store.get_form(99),
            Err(StoreError::NotFound { entity: "form", id: 99 })
        ));
        assert!(matches!(
            store.delete_line_item(5),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn line_items_come_back_ordered_with_unkeyed_rows_last() {
        let store = store();
        let form = form(&store);
        let start = date!(2024 - 03 - 01);
        let unkeyed = line_item(&store, form.id, medication("Aspirin", start, None), None);
        let second = line_item(&store, form.id, medication("Metformin", start, None), Some(20));
        let first = line_item(&store, form.id, vitals(), Some(10));

        let ids: Vec<i64> = store
            .line_items_for_form(form.id)
            .unwrap()
            .iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![first.id, second.id, unkeyed.id]);
    }

    #[test]
    fn line_item_kind_survives_storage() {
        let store = store();
        let form = form(&store);
        let med = line_item(
            &store,
            form.id,
            medication("Lisinopril", date!(2024 - 03 - 05), Some(date!(2024 - 03 - 20))),
            None,
        );
        let vit = line_item(&store, form.id, vitals(), None);

        let med = store.get_line_item(med.id).unwrap();
        let schedule = med.medication().unwrap();
        assert_eq!(schedule.stop_date, Some(date!(2024 - 03 - 20)));
        assert!(store.get_line_item(vit.id).unwrap().is_vitals());
    }

    #[test]
    fn update_line_item_applies_only_the_patch() {
        let store = store();
        let form = form(&store);
        let item = line_item(&store, form.id, medication("Aspirin", date!(2024 - 03 - 01), None), Some(10));
        let patch = LineItemPatch {
            hour: Some(parse_hour("08:00")),
            notes: Some(Some("with breakfast".into())),
            ..Default::default()
        };
        let updated = store.update_line_item(item.id, &patch).unwrap();
        assert_eq!(updated.display_order, Some(10));
        assert_eq!(store.get_line_item(item.id).unwrap().hour, parse_hour("08:00"));
    }

    #[test]
    fn deleting_a_line_item_removes_its_marks() {
        let store = store();
        let form = form(&store);
        let item = line_item(&store, form.id, medication("Aspirin", date!(2024 - 03 - 01), None), None);
        store
            .upsert_marks(&[draft(item.id, 1, "AB"), draft(item.id, 2, "AB")], OnConflict::Reject)
            .unwrap();

        store.delete_line_item(item.id).unwrap();
        assert!(store.marks_for_line_item(item.id).unwrap().is_empty());
    }

    #[test]
    fn clearing_a_row_reports_how_many_marks_went() {
        let store = store();
        let form = form(&store);
        let aspirin = line_item(&store, form.id, medication("Aspirin", date!(2024 - 03 - 01), None), None);
        let other = line_item(&store, form.id, medication("Lisinopril", date!(2024 - 03 - 01), None), None);
        store
            .upsert_marks(
                &[draft(aspirin.id, 1, "AB"), draft(aspirin.id, 2, "AB"), draft(other.id, 1, "CD")],
                OnConflict::Reject,
            )
            .unwrap();

        assert_eq!(store.delete_marks_for_line_item(aspirin.id).unwrap(), 2);
        assert!(store.marks_for_line_item(aspirin.id).unwrap().is_empty());
        assert_eq!(store.marks_for_line_item(other.id).unwrap().len(), 1);
        assert_eq!(store.delete_marks_for_line_item(aspirin.id).unwrap(), 0);
        store.get_line_item(aspirin.id).unwrap();
    }

    #[test]
    fn overwrite_upsert_replaces_existing_cells() {
        let store = store();
        let form = form(&store);
        let item = line_item(&store, form.id, medication("Aspirin", date!(2024 - 03 - 01), None), None);
        store
            .upsert_marks(&[draft(item.id, 3, "AB")], OnConflict::Reject)
            .unwrap();

        let rows = store
            .upsert_marks(&[draft(item.id, 3, "CD"), draft(item.id, 4, "CD")], OnConflict::Overwrite)
            .unwrap();
        assert_eq!(rows.len(), 2);

        let marks = store.marks_for_line_item(item.id).unwrap();
        assert_eq!(marks.len(), 2);
        assert!(marks.iter().all(|m| m.initials == "CD"));
    }

    #[test]
    fn reject_upsert_fails_the_whole_batch_on_a_duplicate() {
        let store = store();
        let form = form(&store);
        let item = line_item(&store, form.id, medication("Aspirin", date!(2024 - 03 - 01), None), None);
        store
            .upsert_marks(&[draft(item.id, 3, "AB")], OnConflict::Reject)
            .unwrap();

        let result = store.upsert_marks(
            &[draft(item.id, 2, "CD"), draft(item.id, 3, "CD")],
            OnConflict::Reject,
        );
        assert!(result.is_err());
        let marks = store.marks_for_line_item(item.id).unwrap();
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].initials, "AB");
    }

    #[test]
    fn marks_can_be_read_by_cell_item_set_and_form() {
        let store = store();
        let form = form(&store);
        let a = line_item(&store, form.id, medication("Aspirin", date!(2024 - 03 - 01), None), None);
        let b = line_item(&store, form.id, vitals(), None);
        store
            .upsert_marks(&[draft(a.id, 1, "AB"), draft(b.id, 1, "120/80")], OnConflict::Reject)
            .unwrap();

        assert!(store.mark_for_cell(a.id, 1).unwrap().is_some());
        assert!(store.mark_for_cell(a.id, 2).unwrap().is_none());
        assert_eq!(store.marks_for_line_items(&[a.id, b.id]).unwrap().len(), 2);
        assert_eq!(store.marks_for_line_items(&[]).unwrap().len(), 0);
        assert_eq!(store.marks_for_form(form.id).unwrap().len(), 2);
    }

    #[test]
    fn update_mark_patches_fields() {
        let store = store();
        let form = form(&store);
        let item = line_item(&store, form.id, medication("Aspirin", date!(2024 - 03 - 01), None), None);
        let mark = store
            .upsert_marks(&[draft(item.id, 1, "AB")], OnConflict::Reject)
            .unwrap()
            .remove(0);

        let patch = MarkPatch {
            status: Some(MarkStatus::NotGiven),
            administered_at: Some(None),
            ..Default::default()
        };
        let updated = store.update_mark(mark.id, &patch).unwrap();
        assert_eq!(updated.status, MarkStatus::NotGiven);
        assert_eq!(updated.initials, "AB");
        assert_eq!(updated.administered_at, None);
    }

    #[test]
    fn prn_entry_numbers_are_never_reused() {
        let store = store();
        let form = form(&store);
        let new = NewPrnRecord {
            form_id: form.id,
            date: date!(2024 - 03 - 02),
            hour: None,
            initials: None,
            medication: "Acetaminophen 500mg".into(),
            reason: "Pain".into(),
            result: None,
            staff_signature: None,
            note: None,
        };
        let first = store.insert_prn_record(&new).unwrap();
        let second = store.insert_prn_record(&new).unwrap();
        let third = store.insert_prn_record(&new).unwrap();
        assert_eq!(
            (first.entry_number, second.entry_number, third.entry_number),
            (1, 2, 3)
        );

        store.delete_prn_record(second.id).unwrap();
        let fourth = store.insert_prn_record(&new).unwrap();
        assert_eq!(fourth.entry_number, 4);

        let numbers: Vec<i64> = store
            .prn_records_for_form(form.id)
            .unwrap()
            .iter()
            .map(|r| r.entry_number)
            .collect();
        assert_eq!(numbers, vec![1, 3, 4]);
    }

    #[test]
    fn vitals_upsert_replaces_the_day() {
        let store = store();
        let form = form(&store);
        let mut values = VitalSigns {
            pulse: Some(72),
            temperature: Some(36.8),
            ..Default::default()
        };
        store.upsert_vitals_reading(form.id, 4, &values).unwrap();
        values.pulse = None;
        let reading = store.upsert_vitals_reading(form.id, 4, &values).unwrap();

        assert_eq!(reading.values.pulse, None);
        assert_eq!(reading.values.temperature, Some(36.8));
        assert_eq!(store.vitals_for_form(form.id).unwrap().len(), 1);
        assert!(store.vitals_for_day(form.id, 5).unwrap().is_none());
    }

    #[test]
    fn deleting_a_form_cascades() {
        let store = store();
        let form = form(&store);
        let item = line_item(&store, form.id, vitals(), None);
        store
            .upsert_marks(&[draft(item.id, 1, "98.6")], OnConflict::Reject)
            .unwrap();

        store.delete_form(form.id).unwrap();
        assert!(store.line_items_for_form(form.id).unwrap().is_empty());
        assert!(store.marks_for_line_item(item.id).unwrap().is_empty());
    }

    #[test]
    fn legends_are_unique_per_clinician() {
        let store = store();
        let legend = NewLegend {
            clinician_id: "rn-1".into(),
            code: "NPO".into(),
            description: "Nothing by mouth".into(),
        };
        let saved = store.insert_legend(&legend).unwrap();
        assert!(store.insert_legend(&legend).is_err());
        assert_eq!(store.legends_for_clinician("rn-1").unwrap(), vec![saved.clone()]);
        assert!(store.legends_for_clinician("rn-2").unwrap().is_empty());

        store.delete_legend(saved.id).unwrap();
        assert!(store.legends_for_clinician("rn-1").unwrap().is_empty());
    }
}
