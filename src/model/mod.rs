// Aspect model: trait-based abstraction over encoder + classification head.
//
// AspectScorer is the interface the pipeline talks to. OnnxAspectScorer is
// the production implementation; tests substitute fixed logit grids.

pub mod files;
pub mod head;
pub mod onnx;
pub mod traits;
