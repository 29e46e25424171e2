pub mod host_executor;
pub mod stats;
pub mod task_executor;
pub mod task_queue_manager;
pub mod task_result;
