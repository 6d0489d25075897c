mod guess;
mod history;
mod result;

pub use guess::{extract_json_object_from_text, AiGuess, UNKNOWN_BREED};
pub use history::{truncate_image_data, HistoryMetadata, HistoryRecord, IMAGE_DATA_MAX_CHARS};
pub use result::{format_confidence, AlternativeMatch, MatchKind, RecognitionResult};
