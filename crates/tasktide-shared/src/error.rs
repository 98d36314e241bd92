use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Title is required")]
    MissingTitle,

    #[error("Invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("Recurring tasks need a recurring type")]
    MissingRecurringType,
}

#[derive(Error, Debug)]
pub enum UndoError {
    #[error("No action to undo")]
    NothingToUndo,

    #[error("Task not found")]
    TaskMissing,

    #[error("History snapshot is not a valid task: {0}")]
    CorruptSnapshot(#[from] serde_json::Error),
}
