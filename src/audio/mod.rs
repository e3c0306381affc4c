// Audio handling for workshop-scribe

pub mod segmenter;
