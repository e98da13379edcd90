//! Logical key naming for every persisted record and queue.

pub struct Keys;

impl Keys {
    pub fn job(id: &str) -> String {
        format!("job:{id}")
    }

    pub fn job_chunks(id: &str) -> String {
        format!("job:chunks:{id}")
    }

    pub fn job_lock(id: &str) -> String {
        format!("job:lock:{id}")
    }

    pub fn queue(name: &str) -> String {
        format!("queue:{name}")
    }

    pub fn node(id: &str) -> String {
        format!("node:{id}")
    }

    pub fn user_nodes(user_id: &str) -> String {
        format!("user_nodes:{user_id}")
    }

    pub fn public_nodes() -> String {
        "publicNodes".to_string()
    }

    /// Set of job ids whose status is presently `running`, tracked
    /// separately from the `assigned` queue so stats can report true
    /// concurrency instead of aliasing it to the assigned count.
    pub fn running_jobs() -> String {
        "runningJobs".to_string()
    }
}
