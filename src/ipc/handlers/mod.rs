pub mod attendance;
pub mod backup;
pub mod classes;
pub mod core;
pub mod recap;
pub mod students;
pub mod subjects;
