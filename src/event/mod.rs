pub mod http_event_service;
