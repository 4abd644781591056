//! SMP coordination core: the typed message frame, its transport, and the
//! Port/Strand/Coordinator endpoints built on top of it.

pub mod coordinator;
pub mod forwarder;
pub mod frame;
pub mod inquirer;
pub mod messages;
pub mod port;
pub mod questioner;
pub mod shared_listen;
pub mod strand;
pub mod strand_search;
pub mod transport;

pub use coordinator::Coordinator;
pub use forwarder::{Forwarder, ForwarderOutcome};
pub use frame::Frame;
pub use inquirer::{Aggregator, Inquirer};
pub use messages::MessageType;
pub use port::{Port, PortHandler};
pub use questioner::{QuestionerId, RequestId, RequestIdAllocator};
pub use shared_listen::{FdNote, ListenerCache, OpenListenerParams, SharedListenRequest, SharedListenResponse};
pub use strand::{KidId, Strand};
pub use strand_search::StrandSearchRegistry;
pub use transport::{RetryPolicy, UdsTransport};
