pub mod camera;
pub mod spheres;

pub use camera::OrbitCamera;
pub use spheres::SphereRenderer;
