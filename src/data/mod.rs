//! L2/L3 — the on-disk record layout and the physical file that stores it.

mod data_file;
mod log_record;

pub use data_file::{
    data_file_name, DataFile, DATA_FILE_NAME_SUFFIX, HINT_FILE_NAME, MERGE_FINISHED_FILE_NAME,
    SEQ_NO_FILE_NAME,
};
pub use log_record::{
    decode_record, LogRecord, LogRecordType, ReadLogRecord, RecordPosition, TransactionRecord,
    MAX_LOG_RECORD_HEADER_SIZE,
};
