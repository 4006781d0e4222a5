pub mod flagging;
pub mod ingest;
pub mod lifecycle;
pub mod normalizer;
pub mod notify;
pub mod parser;
pub mod temporal;
