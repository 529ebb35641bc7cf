/// Instruction sent with every question. The model must answer with a JSON object.
pub(super) fn keyword_prompt(question: &str, max_keywords: usize) -> String {
    let min_keywords = max_keywords.min(3);
    format!(
        r#"You extract search keywords for the ScienceON academic paper search API.

Question: "{question}"

Extract {min_keywords}-{max_keywords} core keywords in Korean and {min_keywords}-{max_keywords} core keywords in English.

Rules:
- Prefer technical and domain-specific terms.
- If a term has both an abbreviation and a full form (e.g. SVM, NLP, Warehouse Management System), include both.
- If the question spells out a full technical term, always include it as a keyword.
- Keep each keyword between 1 and 20 characters.

Respond with JSON only, in exactly this shape:
{{"korean": ["키워드1", "키워드2"], "english": ["keyword1", "keyword2"]}}"#
    )
}
