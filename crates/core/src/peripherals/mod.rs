pub mod stdout_sink;
