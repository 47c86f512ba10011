pub mod hints;
pub mod student_states;
pub mod submissions;
pub mod viva_sessions;
