use std::sync::Arc;

use crate::ocr::RegionDetector;
use crate::overlay::Compositor;
use crate::pipeline::Pipeline;
use crate::providers::Provider;

pub struct ServerState<P: Provider, D: RegionDetector> {
    pub(crate) pipeline: Pipeline<P, D>,
    pub(crate) compositor: Arc<Compositor>,
}

impl<P: Provider, D: RegionDetector> ServerState<P, D> {
    pub fn new(pipeline: Pipeline<P, D>, compositor: Compositor) -> Self {
        Self {
            pipeline,
            compositor: Arc::new(compositor),
        }
    }
}
