pub mod block;
pub mod cov;
pub mod metric;
pub mod rgcca;
pub mod scheme;

pub use block::InitMethod;
pub use rgcca::Rgcca;
pub use rgcca::RgccaBuilder;
pub use rgcca::RgccaFit;
pub use rgcca::Shrinkage;
pub use rgcca::ShrinkageEstimator;
pub use scheme::Scheme;
