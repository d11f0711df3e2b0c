//! Correlated transaction protocol: match one outgoing message with the
//! callback transaction that echoes its call id.

pub mod call_id;
pub mod dispose;
pub mod event;
pub mod filter;
pub mod operation;

pub use call_id::CorrelationId;
pub use dispose::{DisposeSignal, Disposer};
pub use event::{decode_function_call, CallbackKind, CallbackMethods, FunctionCall, RawTransaction, TransactionEvent};
pub use filter::EventStreamFilter;
pub use operation::{await_first_match, CorrelatedOperation, OperationFailure, OperationOutcome, OperationSpec};
