use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("cannot read {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{} contains no questions", .0.display())]
    Empty(PathBuf),
}

/// Questions from the first column of a CSV file with a header row.
/// Blank cells are skipped; `max_queries` keeps only the first N.
pub fn load_questions(path: &Path, max_queries: Option<usize>) -> Result<Vec<String>, InputError> {
    let csv_err = |source| InputError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let mut questions = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        if let Some(question) = record.get(0).map(str::trim)
            && !question.is_empty()
        {
            questions.push(question.to_string());
        }
        if max_queries.is_some_and(|max| questions.len() >= max) {
            break;
        }
    }

    if questions.is_empty() {
        return Err(InputError::Empty(path.to_path_buf()));
    }
    Ok(questions)
}
