//! API Module
//!
//! Request, response and streaming types for the Responses API, plus the
//! helpers built on them.

pub mod images;
pub mod pricing;
pub mod request;
pub mod response;
pub mod schema;
pub mod streaming;

pub use images::{create_message_with_images, encode_image_file, ImageInput};
pub use pricing::{Pricing, PricingTable};
pub use request::{
    ContentPart, ImageDetail, Input, InputItem, Message, MessageContent, Reasoning,
    RequestOptions, ResponseRequest, Role, TextConfig, TextFormat, Tool, ToolChoice,
};
pub use response::{
    ApiErrorBody, FunctionCall, OutputContent, OutputItem, OutputMessage, ReasoningItem, Response,
    ResponseStatus, TokenUsage, Usage,
};
pub use schema::Schema;
pub use streaming::{
    decode_events, parse_frame, ResponseStream, SseDecoder, SseFrame, StreamAccumulator,
    StreamEvent, TextDeltas,
};
