use image::RgbaImage;

/// Terminal cells are roughly twice as tall as they are wide.
const CELL_ASPECT: f64 = 2.0;

pub type Rgb = [u8; 3];

/// A decoded image reduced to solid background-colored cells. `None` cells
/// are letterbox padding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CellArt {
    pub cols: u16,
    pub rows: u16,
    pub cells: Vec<Vec<Option<Rgb>>>,
}

impl CellArt {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Fits `image` into a `cols` x `rows` grid, keeping its aspect ratio and
/// centering it. Each covered cell averages four sub-sampled source pixels.
pub fn rasterize(image: &RgbaImage, cols: u16, rows: u16) -> CellArt {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || cols == 0 || rows == 0 {
        return CellArt::default();
    }

    let (draw_cols, draw_rows) = fit(width, height, cols, rows);
    let left = (cols - draw_cols) / 2;
    let top = (rows - draw_rows) / 2;

    let cell_w = width as f64 / draw_cols as f64;
    let cell_h = height as f64 / draw_rows as f64;

    let mut cells = vec![vec![None; cols as usize]; rows as usize];
    for row in 0..draw_rows {
        for col in 0..draw_cols {
            let x0 = col as f64 * cell_w;
            let y0 = row as f64 * cell_h;
            let samples = [(0.25, 0.25), (0.75, 0.25), (0.25, 0.75), (0.75, 0.75)];
            let mut sum = [0u32; 3];
            for (fx, fy) in samples {
                let x = ((x0 + fx * cell_w) as u32).min(width - 1);
                let y = ((y0 + fy * cell_h) as u32).min(height - 1);
                let pixel = image.get_pixel(x, y).0;
                let alpha = pixel[3] as u32;
                for channel in 0..3 {
                    sum[channel] += pixel[channel] as u32 * alpha / 255;
                }
            }
            cells[(top + row) as usize][(left + col) as usize] =
                Some([(sum[0] / 4) as u8, (sum[1] / 4) as u8, (sum[2] / 4) as u8]);
        }
    }

    CellArt { cols, rows, cells }
}

/// Largest cell box with the image's aspect ratio that fits the grid.
fn fit(width: u32, height: u32, cols: u16, rows: u16) -> (u16, u16) {
    let image_ratio = width as f64 / height as f64;
    let grid_ratio = cols as f64 / (rows as f64 * CELL_ASPECT);
    let (draw_cols, draw_rows) = if image_ratio >= grid_ratio {
        let draw_rows = (cols as f64 / image_ratio / CELL_ASPECT).round();
        (cols as f64, draw_rows)
    } else {
        let draw_cols = (rows as f64 * CELL_ASPECT * image_ratio).round();
        (draw_cols, rows as f64)
    };
    (
        (draw_cols as u16).clamp(1, cols),
        (draw_rows as u16).clamp(1, rows),
    )
}
