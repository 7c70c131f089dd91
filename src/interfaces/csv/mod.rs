pub mod event_reader;
pub mod schedule_writer;
