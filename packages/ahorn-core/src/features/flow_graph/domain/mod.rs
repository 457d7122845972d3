mod cfg;
mod edge;
mod vertex;

pub use cfg::{Cfg, CfgKind, CfgRef, FlattenedVariable, Label};
pub use edge::{Edge, EdgeKind};
pub use vertex::{Vertex, VertexKind};
