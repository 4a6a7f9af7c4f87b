//! HTML rendering of the dashboard.
//!
//! Rendering is a pure function of the freshly loaded table and the
//! session's UI state; it never touches the store.

use handlebars::{Handlebars, RenderError, TemplateError};
use serde::Serialize;

use crate::record::{COLUMNS, MedicationTable, PatientRecord, RecordFields};
use crate::session::{Flash, FormView, SessionState};

pub const PAGE_TITLE: &str = "Senior Medication Dashboard";

const DASHBOARD_TEMPLATE: &str = "dashboard";
const ERROR_TEMPLATE: &str = "error";

/// Register the page templates.
pub fn templates() -> Result<Handlebars<'static>, TemplateError> {
    let mut registry = Handlebars::new();
    registry.register_template_string(
        DASHBOARD_TEMPLATE,
        include_str!("./templates/dashboard.hbs"),
    )?;
    registry.register_template_string(ERROR_TEMPLATE, include_str!("./templates/error.hbs"))?;
    Ok(registry)
}

#[derive(Serialize)]
struct FieldView<'a> {
    name: &'static str,
    label: &'static str,
    value: &'a str,
}

#[derive(Serialize)]
struct OptionView<'a> {
    id: &'a str,
    selected: bool,
}

#[derive(Serialize)]
struct ModifyView<'a> {
    patient_id: &'a str,
    fields: Vec<FieldView<'a>>,
}

#[derive(Serialize)]
struct DashboardPage<'a> {
    title: &'static str,
    flash: Option<&'a Flash>,
    columns: &'static [&'static str],
    rows: Vec<[&'a str; 10]>,
    add_form: Option<Vec<FieldView<'a>>>,
    patient_options: Vec<OptionView<'a>>,
    modify_form: Option<ModifyView<'a>>,
}

#[derive(Serialize)]
struct ErrorPage<'a> {
    title: &'static str,
    message: &'a str,
}

fn add_fields(draft: &PatientRecord) -> Vec<FieldView<'_>> {
    vec![
        FieldView { name: "patient_id", label: "Patient ID", value: &draft.patient_id },
        FieldView { name: "name", label: "Name", value: &draft.name },
        FieldView { name: "medication_name", label: "Medication Name", value: &draft.medication_name },
        FieldView { name: "dosage", label: "Dosage", value: &draft.dosage },
        FieldView { name: "phone_number", label: "Phone Number", value: &draft.phone_number },
        FieldView { name: "time", label: "Time (e.g., 09:00 AM)", value: &draft.time },
        FieldView {
            name: "last_administered_date",
            label: "Last Administered Date",
            value: &draft.last_administered_date,
        },
        FieldView { name: "frequency", label: "Frequency", value: &draft.frequency },
        FieldView { name: "notes", label: "Notes", value: &draft.notes },
        FieldView { name: "next_due_date", label: "Next Due Date", value: &draft.next_due_date },
    ]
}

fn modify_fields(fields: &RecordFields) -> Vec<FieldView<'_>> {
    vec![
        FieldView { name: "name", label: "Name", value: &fields.name },
        FieldView { name: "medication_name", label: "Medication Name", value: &fields.medication_name },
        FieldView { name: "time", label: "Time", value: &fields.time },
        FieldView { name: "phone_number", label: "Phone Number", value: &fields.phone_number },
        FieldView { name: "frequency", label: "Frequency", value: &fields.frequency },
        FieldView { name: "notes", label: "Notes", value: &fields.notes },
        FieldView { name: "dosage", label: "Dosage", value: &fields.dosage },
        FieldView { name: "next_due_date", label: "Next Due Date", value: &fields.next_due_date },
        FieldView {
            name: "last_administered_date",
            label: "Last Administered Date",
            value: &fields.last_administered_date,
        },
    ]
}

/// Render the dashboard page.
///
/// `flash` is passed separately because it is consumed from the session
/// before rendering.
pub fn render_dashboard(
    registry: &Handlebars<'_>,
    table: &MedicationTable,
    session: &SessionState,
    flash: Option<&Flash>,
) -> Result<String, RenderError> {
    let selected = session
        .selected_id
        .as_deref()
        .filter(|id| table.contains_id(id))
        .or_else(|| table.ids().first().copied());

    // Values for the modify form: a rejected draft, else the stored record.
    let stored_fields;
    let modify_form = match &session.view {
        FormView::ModifyFormOpen { patient_id, draft } => {
            let fields = match draft {
                Some(draft) => Some(draft),
                None => {
                    stored_fields = table.find(patient_id).map(PatientRecord::fields);
                    stored_fields.as_ref()
                }
            };
            fields.map(|fields| ModifyView {
                patient_id: patient_id.as_str(),
                fields: modify_fields(fields),
            })
        }
        _ => None,
    };

    let page = DashboardPage {
        title: PAGE_TITLE,
        flash,
        columns: &COLUMNS,
        rows: table.records().iter().map(PatientRecord::values).collect(),
        add_form: match &session.view {
            FormView::AddFormOpen { draft } => Some(add_fields(draft)),
            _ => None,
        },
        patient_options: table
            .ids()
            .into_iter()
            .map(|id| OptionView {
                id,
                selected: Some(id) == selected,
            })
            .collect(),
        modify_form,
    };
    registry.render(DASHBOARD_TEMPLATE, &page)
}

/// Render a full-page error, used when the table cannot be loaded.
pub fn render_error(registry: &Handlebars<'_>, message: &str) -> Result<String, RenderError> {
    registry.render(
        ERROR_TEMPLATE,
        &ErrorPage {
            title: PAGE_TITLE,
            message,
        },
    )
}
