//! Daily vital-signs readings.

use super::{LogStoreError, MarEditor};
use crate::db::RecordStore;
use crate::error::{MarResult, ValidationError};
use crate::models::{VitalSign, VitalSigns, VitalSignsReading, GRID_DAYS};
use std::str::FromStr;
use tracing::debug;

fn parse_number<T: FromStr>(sign: VitalSign, input: &str) -> Result<T, ValidationError> {
    input.parse().map_err(|_| ValidationError::InvalidValue {
        field: sign.label(),
        input: input.to_string(),
    })
}

fn parse_measure(sign: VitalSign, input: &str) -> Result<f64, ValidationError> {
    let value: f64 = parse_number(sign, input)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ValidationError::InvalidValue {
            field: sign.label(),
            input: input.to_string(),
        })
    }
}

/// Writes one field of `values` from user input. Empty input clears the field.
pub fn apply_vital_input(
    values: &mut VitalSigns,
    sign: VitalSign,
    input: &str,
) -> Result<(), ValidationError> {
    let input = input.trim();
    let present = !input.is_empty();
    match sign {
        VitalSign::Temperature => {
            values.temperature = present.then(|| parse_measure(sign, input)).transpose()?
        }
        VitalSign::Weight => values.weight = present.then(|| parse_measure(sign, input)).transpose()?,
        VitalSign::Pulse => values.pulse = present.then(|| parse_number(sign, input)).transpose()?,
        VitalSign::Respiration => {
            values.respiration = present.then(|| parse_number(sign, input)).transpose()?
        }
        VitalSign::Systolic => {
            values.systolic = present.then(|| parse_number(sign, input)).transpose()?
        }
        VitalSign::Diastolic => {
            values.diastolic = present.then(|| parse_number(sign, input)).transpose()?
        }
        VitalSign::BowelMovement => values.bowel_movement = present.then(|| input.to_string()),
    }
    Ok(())
}

impl<S: RecordStore> MarEditor<'_, S> {
    pub fn vitals(&self, form_id: i64) -> MarResult<Vec<VitalSignsReading>> {
        Ok(self.store.vitals_for_form(form_id)?)
    }

    /// Sets one measurement of a day's reading, leaving the others as they are.
    pub fn set_vital_sign(
        &self,
        form_id: i64,
        day: u8,
        sign: VitalSign,
        input: &str,
    ) -> MarResult<VitalSignsReading> {
        if !(1..=GRID_DAYS).contains(&day) {
            return Err(ValidationError::DayOutOfRange(day).into());
        }
        self.store.get_form(form_id)?;
        let mut values = self
            .store
            .vitals_for_day(form_id, day)?
            .map(|reading| reading.values)
            .unwrap_or_default();
        apply_vital_input(&mut values, sign, input)?;

        let reading = self
            .store
            .upsert_vitals_reading(form_id, day, &values)
            .logged("upsert vitals reading")?;
        debug!(form_id, day, sign = sign.label(), "vital sign recorded");
        Ok(reading)
    }

    /// Replaces a whole day's reading from dialog input, one entry per sign.
    /// Blank input clears its measurement.
    ///
    /// Nothing is written when the reading is unchanged, and `None` is returned.
    pub fn set_vitals(
        &self,
        form_id: i64,
        day: u8,
        inputs: &[(VitalSign, &str)],
    ) -> MarResult<Option<VitalSignsReading>> {
        if !(1..=GRID_DAYS).contains(&day) {
            return Err(ValidationError::DayOutOfRange(day).into());
        }
        self.store.get_form(form_id)?;
        let existing = self
            .store
            .vitals_for_day(form_id, day)?
            .map(|reading| reading.values)
            .unwrap_or_default();
        let mut values = existing.clone();
        for &(sign, input) in inputs {
            apply_vital_input(&mut values, sign, input)?;
        }
        if values == existing {
            return Ok(None);
        }

        let reading = self
            .store
            .upsert_vitals_reading(form_id, day, &values)
            .logged("upsert vitals reading")?;
        debug!(form_id, day, "vital signs recorded");
        Ok(Some(reading))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::*;
    use crate::engine::testing::editor;

    #[test]
    fn each_field_is_set_and_cleared_independently() {
        let store = store();
        let editor = editor(&store);
        let form = form(&store);
        editor.set_vital_sign(form.id, 3, VitalSign::Pulse, "72").unwrap();
        editor.set_vital_sign(form.id, 3, VitalSign::Temperature, "36.9").unwrap();
        editor
            .set_vital_sign(form.id, 3, VitalSign::BowelMovement, " Large, soft ")
            .unwrap();
        let reading = editor.set_vital_sign(form.id, 3, VitalSign::Pulse, "").unwrap();

        assert_eq!(reading.values.pulse, None);
        assert_eq!(reading.values.temperature, Some(36.9));
        assert_eq!(reading.values.bowel_movement.as_deref(), Some("Large, soft"));
        assert_eq!(editor.vitals(form.id).unwrap().len(), 1);
    }

    #[test]
    fn numbers_must_parse() {
        let mut values = VitalSigns::default();
        assert_eq!(
            apply_vital_input(&mut values, VitalSign::Systolic, "high"),
            Err(ValidationError::InvalidValue {
                field: "systolic pressure",
                input: "high".into(),
            })
        );
        assert!(apply_vital_input(&mut values, VitalSign::Weight, "NaN").is_err());
        assert!(apply_vital_input(&mut values, VitalSign::Respiration, "16.5").is_err());
        apply_vital_input(&mut values, VitalSign::Diastolic, " 80 ").unwrap();
        assert_eq!(values.diastolic, Some(80));
    }

    #[test]
    fn a_reading_shown_in_the_dialog_can_be_cleared_field_by_field() {
        let store = store();
        let editor = editor(&store);
        let form = form(&store);
        editor.set_vital_sign(form.id, 5, VitalSign::Temperature, "37.2").unwrap();
        editor.set_vital_sign(form.id, 5, VitalSign::Pulse, "88").unwrap();

        let shown = &editor.vitals(form.id).unwrap()[0].values;
        let mut inputs: Vec<(VitalSign, String)> = VitalSign::ALL
            .iter()
            .map(|&sign| (sign, shown.value(sign).unwrap_or_default()))
            .collect();
        assert_eq!(inputs[0].1, "37.2");
        assert_eq!(inputs[1].1, "88");

        let borrowed: Vec<(VitalSign, &str)> =
            inputs.iter().map(|(sign, text)| (*sign, text.as_str())).collect();
        assert_eq!(editor.set_vitals(form.id, 5, &borrowed).unwrap(), None);

        inputs[1].1.clear();
        let borrowed: Vec<(VitalSign, &str)> =
            inputs.iter().map(|(sign, text)| (*sign, text.as_str())).collect();
        let reading = editor.set_vitals(form.id, 5, &borrowed).unwrap().unwrap();
        assert_eq!(reading.values.pulse, None);
        assert_eq!(reading.values.temperature, Some(37.2));
        assert!(!reading.values.is_empty());
    }

    #[test]
    fn days_outside_the_grid_are_refused() {
        let store = store();
        let editor = editor(&store);
        let form = form(&store);
        assert!(editor.set_vital_sign(form.id, 32, VitalSign::Pulse, "70").is_err());
        assert!(editor.set_vital_sign(form.id, 0, VitalSign::Pulse, "70").is_err());
    }
}
