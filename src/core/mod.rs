pub mod text;
pub mod tts;

// Re-export commonly used types for convenience
pub use text::{
    ByteBudget, Granularity, SmartSplit, SplitError, SplitOptions, SplitResult, Splitter,
    escape_xml, replace_incompatible, split_stream,
};

pub use tts::{
    EdgeTts, Message, MessageStream, Rate, RequestGroup, SessionError, SessionResult, SsmlOptions,
    Synthesis, Voice, VoiceListError, Volume, communicate, make_ssml,
};
