pub mod bundle;
pub mod intrinsic;
pub mod runner;
pub mod template;

pub use bundle::{list_files, package_dir};
pub use runner::{parse_stack_outputs, AwsCli};
pub use template::{write_template, CfnExport, CfnOutput, CfnResource, CfnTemplate, RenderError};
