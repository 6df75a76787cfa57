fn main() {
    // Rebuild when the embedded compute or draw shaders change
    println!("cargo:rerun-if-changed=shaders/sim_common.wgsl");
    println!("cargo:rerun-if-changed=shaders/grid_assign.wgsl");
    println!("cargo:rerun-if-changed=shaders/bitonic_sort.wgsl");
    println!("cargo:rerun-if-changed=shaders/cell_clear.wgsl");
    println!("cargo:rerun-if-changed=shaders/cell_range.wgsl");
    println!("cargo:rerun-if-changed=shaders/integrate.wgsl");
    println!("cargo:rerun-if-changed=shaders/sphere_draw.wgsl");
}
