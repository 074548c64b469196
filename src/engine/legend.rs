//! The legend of codes shown under the grid.

use super::administration::normalize_code;
use super::{LogStoreError, MarEditor};
use crate::db::RecordStore;
use crate::error::{MarResult, ValidationError};
use crate::models::{CustomLegend, LegendEntry, NewLegend};
use tracing::debug;

/// The entry next to `current` in `legend`, wrapping at either end.
///
/// A code that is blank or not in the legend starts from the first entry
/// going forward and from the last going back.
pub fn cycle_code<'a>(legend: &'a [LegendEntry], current: &str, forward: bool) -> Option<&'a LegendEntry> {
    let len = legend.len();
    if len == 0 {
        return None;
    }
    let position = legend
        .iter()
        .position(|entry| entry.code.eq_ignore_ascii_case(current.trim()));
    let index = match (position, forward) {
        (Some(index), true) => (index + 1) % len,
        (Some(index), false) => (index + len - 1) % len,
        (None, true) => 0,
        (None, false) => len - 1,
    };
    legend.get(index)
}

impl<S: RecordStore> MarEditor<'_, S> {
    /// Built-in codes followed by the clinician's own codes.
    pub fn legend(&self) -> MarResult<Vec<LegendEntry>> {
        let mut entries = self.settings.legend.clone();
        for custom in self.custom_legends()? {
            if !self.is_builtin_code(&custom.code) {
                entries.push(LegendEntry {
                    code: custom.code,
                    description: custom.description,
                });
            }
        }
        Ok(entries)
    }

    pub fn custom_legends(&self) -> MarResult<Vec<CustomLegend>> {
        match &self.clinician {
            Some(clinician) => Ok(self.store.legends_for_clinician(clinician)?),
            None => Ok(Vec::new()),
        }
    }

    /// Saves a reusable code for the current clinician.
    ///
    /// # Errors
    ///
    /// The code is upper-cased and must be non-empty, no longer than the
    /// initials limit and not a built-in code. A clinician must be set.
    pub fn add_custom_legend(&self, code: &str, description: &str) -> MarResult<CustomLegend> {
        let clinician = self
            .clinician
            .clone()
            .ok_or(ValidationError::MissingField("clinician"))?;
        let code = normalize_code(code, &self.settings)?;
        if self.is_builtin_code(&code) {
            return Err(ValidationError::ReservedLegendCode(code).into());
        }
        let description = description.trim();
        if description.is_empty() {
            return Err(ValidationError::MissingField("description").into());
        }
        let legend = self
            .store
            .insert_legend(&NewLegend {
                clinician_id: clinician,
                code,
                description: description.to_string(),
            })
            .logged("insert legend")?;
        debug!(code = %legend.code, "custom legend added");
        Ok(legend)
    }

    pub fn delete_custom_legend(&self, id: i64) -> MarResult<()> {
        self.store.delete_legend(id).logged("delete legend")?;
        Ok(())
    }

    fn is_builtin_code(&self, code: &str) -> bool {
        self.settings
            .legend
            .iter()
            .any(|entry| entry.code.eq_ignore_ascii_case(code.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::*;
    use crate::engine::testing::editor;
    use crate::error::MarError;

    #[test]
    fn custom_codes_follow_the_builtins() {
        let store = store();
        let editor = editor(&store);
        let saved = editor.add_custom_legend(" npo ", "Nothing by mouth").unwrap();
        assert_eq!(saved.code, "NPO");

        let legend = editor.legend().unwrap();
        assert_eq!(legend[0].code, "DC");
        assert_eq!(legend.last(), Some(&LegendEntry::new("NPO", "Nothing by mouth")));

        editor.delete_custom_legend(saved.id).unwrap();
        assert_eq!(editor.legend().unwrap().len(), editor.settings().legend.len());
    }

    #[test]
    fn custom_codes_can_be_picked_by_cycling() {
        let store = store();
        let editor = editor(&store);
        editor.add_custom_legend("NPO", "Nothing by mouth").unwrap();
        let legend = editor.legend().unwrap();
        let last_builtin = &editor.settings().legend.last().unwrap().code;

        let next = cycle_code(&legend, last_builtin, true).unwrap();
        assert_eq!(next.code, "NPO");
        assert_eq!(cycle_code(&legend, "npo", true).unwrap().code, legend[0].code);
        assert_eq!(cycle_code(&legend, "", true).unwrap().code, legend[0].code);
        assert_eq!(cycle_code(&legend, "AB", false).unwrap().code, "NPO");
        assert_eq!(cycle_code(&[], "DC", true), None);
    }

    #[test]
    fn builtin_and_oversized_codes_are_refused() {
        let store = store();
        let editor = editor(&store);
        assert!(matches!(
            editor.add_custom_legend("dc", "Duplicate"),
            Err(MarError::Validation(ValidationError::ReservedLegendCode(_)))
        ));
        assert!(matches!(
            editor.add_custom_legend("LONGER", "Too long"),
            Err(MarError::Validation(ValidationError::CodeTooLong { .. }))
        ));
        assert!(editor.add_custom_legend("X", " ").is_err());
    }

    #[test]
    fn legends_belong_to_a_clinician() {
        let store = store();
        editor(&store).add_custom_legend("NPO", "Nothing by mouth").unwrap();

        let other = MarEditor::new(&store, editor(&store).settings().clone()).with_clinician("rn-2");
        assert_eq!(other.legend().unwrap().len(), other.settings().legend.len());

        let anonymous = MarEditor::new(&store, other.settings().clone());
        assert!(anonymous.add_custom_legend("NPO", "Nothing by mouth").is_err());
    }
}
