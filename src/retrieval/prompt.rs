//! Augmented prompt assembly

/// Instruction block preceding the retrieved context
const INSTRUCTIONS: &str = "Basado EXCLUSIVAMENTE en la siguiente información de la normativa de la UFRO, \
responde la pregunta del usuario. Si la información no es suficiente o no permite una respuesta completa, \
indica claramente que no puedes responderla con el contexto proporcionado (Política de Abstención).";

/// Separator between retrieved chunks in the context block
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Build the single user prompt sent to the backend
///
/// Contexts appear in retrieval order; the query is embedded verbatim.
pub fn build_prompt<S: AsRef<str>>(query: &str, contexts: &[S]) -> String {
    let context = contexts
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    format!(
        "{}\n\n### Contexto:\n{}\n\n### Pregunta del usuario:\n{}",
        INSTRUCTIONS, context, query
    )
}
