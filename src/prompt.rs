//! Prompt text sent to the generation service.
//!
//! The output-schema block must list exactly the labels the parser
//! recognises; see [`crate::model::CatalogField`].

use crate::language::Language;
use crate::model::ObjectContext;

const REGISTRAR_PREAMBLE: &str = "You are a registrar / documentation specialist in a technical museum. \
Create a factual, verifiable catalog entry. \
Describe only characteristics explicitly stated in the metadata or clearly visible/identified: \
form, materials, construction/components, visible surface features, inscriptions/markings, dimensions/weight, condition traces. \
Do not provide interpretations, assumptions, historical context, or inferred functions. \
Do not mention functions or uses unless explicitly stated. \
Avoid subjective adjectives and speculative language. \
Write in precise, neutral museum terminology. \
Use only the provided information.";

/// Builds the full instruction for one object in one language.
pub fn build_prompt(object_id: &str, context: &ObjectContext, language: Language) -> String {
    format!(
        "{REGISTRAR_PREAMBLE}\n\nWrite the content in {name}.\n\n{metadata}\n\n{schema}",
        name = language.name(),
        metadata = metadata_block(object_id, context, language),
        schema = output_schema(language),
    )
}

fn metadata_block(object_id: &str, context: &ObjectContext, language: Language) -> String {
    let value = |raw: &Option<String>| -> String {
        match raw.as_deref() {
            Some(text) if !text.trim().is_empty() => text.to_string(),
            _ => language.not_specified().to_string(),
        }
    };

    format!(
        "Object ID: {object_id}\n\
         Title: {title}\n\
         Manufacturer/Collection: {manufacturer}\n\
         Date: {date}\n\
         Dimensions/Description: {description}\n\
         Weight: {weight}\n\
         Location: {location}\n\
         Additional Notes: {notes}\n",
        title = value(&context.title),
        manufacturer = value(&context.manufacturer),
        date = value(&context.date),
        description = value(&context.description),
        weight = value(&context.weight),
        location = value(&context.location),
        notes = value(&context.notes),
    )
}

fn output_schema(language: Language) -> String {
    let name = language.name();
    let ns = language.not_specified();
    format!(
        "Provide the entry in the following exact label format. \
         Write the content in {name} (the labels remain in English):\n\
         Title: <text or '{ns}'>\n\
         Object ID: <value>\n\
         Manufacturer/Collection: <value or '{ns}'>\n\
         Date: <value or '{ns}'>\n\
         Dimensions: <value or '{ns}'>\n\
         Weight: <value or '{ns}'>\n\
         Location: <value or '{ns}'>\n\
         Description: 2–5 sentences. Only observable/stated features. No function, context, or evaluation."
    )
}
