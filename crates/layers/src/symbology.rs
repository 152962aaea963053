/// Line width at zoom 0, in world units (Earth radii).
pub const BASE_LINE_THICKNESS: f64 = 0.008;

/// A source layer the map draws, and the flat colour it is drawn with.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RenderLayer {
    pub name: &'static str,
    pub color: [f32; 3],
}

impl RenderLayer {
    pub const fn new(name: &'static str, color: [f32; 3]) -> Self {
        Self { name, color }
    }
}

const BLUE: [f32; 3] = [0.0, 0.0, 1.0];
const WHITE: [f32; 3] = [1.0, 1.0, 1.0];
const ORANGE: [f32; 3] = [1.0, 0.647, 0.0];
const GRAY: [f32; 3] = [0.5, 0.5, 0.5];

/// Draw order, back to front. Layers not listed here are decoded but never
/// meshed or drawn.
pub static RENDER_LAYERS: [RenderLayer; 7] = [
    RenderLayer::new("water", BLUE),
    RenderLayer::new("waterway", BLUE),
    RenderLayer::new("admin", WHITE),
    RenderLayer::new("building", ORANGE),
    RenderLayer::new("structure", ORANGE),
    RenderLayer::new("road", GRAY),
    RenderLayer::new("motorway_junction", GRAY),
];

pub fn render_layer(name: &str) -> Option<&'static RenderLayer> {
    RENDER_LAYERS.iter().find(|l| l.name == name)
}

/// Lines keep a constant on-screen width by halving with every zoom level.
pub fn line_thickness(base: f64, zoom: f64) -> f64 {
    base * 2f64.powf(-zoom)
}
