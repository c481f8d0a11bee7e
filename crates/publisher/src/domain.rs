mod publish_service;

pub use publish_service::PublishService;
