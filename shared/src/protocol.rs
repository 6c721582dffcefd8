/// Model used when the create form does not select one.
pub const DEFAULT_MODEL: &str = "gpt-4-turbo";

/// Schema text used when an agent is created without any table descriptions.
pub const NO_SCHEMA_PLACEHOLDER: &str = "No schema provided.";

/// Generic message returned when an assistant run does not complete.
pub const RUN_FAILED_MESSAGE: &str = "AI response failed. Please try again.";

/// Message returned when the turn exceeds its polling budget.
pub const RUN_TIMEOUT_MESSAGE: &str = "AI response timed out. Please try again.";
