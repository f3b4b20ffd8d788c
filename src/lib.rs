//! fed9u-rs: event buffer codec for CMS tracker Front-End Driver boards
//!
//! Decodes captured FED event buffers into per-channel samples and clusters,
//! and encodes strip data back into byte-exact buffers with CRC.
//!
//! # Example
//! ```
//! use fed9u_rs::fed::{BufferEncoder, EventDecoder, EventId, STRIPS_PER_FED};
//!
//! let mut strips = vec![0u16; STRIPS_PER_FED];
//! strips[5000] = 800;
//! let id = EventId { event_number: 1, bunch_crossing: 42 };
//! let buffer = BufferEncoder::default().encode(id, &strips, None).unwrap();
//!
//! let event = EventDecoder::default().parse(buffer.words()).unwrap();
//! assert_eq!(event.bunch_crossing(), 42);
//! assert!(event.check_event(true).is_ok());
//! assert_eq!(event.channel(19).unwrap().clusters().unwrap().len(), 1);
//! ```

pub mod common;
pub mod config;
pub mod fed;
pub mod simulator;
