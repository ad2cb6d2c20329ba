pub mod admin;
pub mod gate;
pub mod orders;
pub mod users;

pub async fn health() -> &'static str {
    "ok"
}
