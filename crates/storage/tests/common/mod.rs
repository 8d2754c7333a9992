pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{
    IMPLEMENTATION_CLASS_UID, Part10, byte_stream, failing_stream, photo_instance, spooled_payload,
};
