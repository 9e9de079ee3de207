//! Operator push operations (layout, unit settings, windows, routing)

mod service;

pub use service::{
    field_options, FieldOption, FieldOptions, MvControlService, MvParamsUpdate, WindowUpdate,
};
