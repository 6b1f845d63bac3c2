mod service;

pub use service::MaintenanceService;
