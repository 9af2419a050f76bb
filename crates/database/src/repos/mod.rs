//! Database repository implementations

pub mod chat_room_repository;
pub mod notification_repository;
pub mod organization_repository;
pub mod user_repository;

pub use chat_room_repository::ChatRoomRepository;
pub use notification_repository::NotificationRepository;
pub use organization_repository::OrganizationRepository;
pub use user_repository::UserRepository;
