pub mod registry;
pub mod rule;
pub mod step;

pub use registry::ConversionRegistry;
pub use rule::{ConversionRule, EnumMapping, EnumVariant};
pub use step::{ConvertStep, ConverterFn};
