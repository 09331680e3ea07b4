pub mod test_helpers {
    use std::fmt::Write as _;
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use image::codecs::png::PngEncoder;
    use image::{ExtendedColorType, ImageEncoder};

    use crate::alto::{ALTO_NS, BoundingBox};
    use crate::render::{Clock, PagePair};

    /// Builder for small ALTO v2 documents
    pub struct AltoBuilder {
        width: Option<i64>,
        height: Option<i64>,
        body: String,
    }

    impl AltoBuilder {
        pub fn new(width: i64, height: i64) -> Self {
            Self {
                width: Some(width),
                height: Some(height),
                body: String::new(),
            }
        }

        /// Leave out the page HEIGHT attribute
        pub fn without_height(mut self) -> Self {
            self.height = None;
            self
        }

        pub fn block(mut self, id: &str, bbox: BoundingBox) -> Self {
            let _ = writeln!(self.body, "<ComposedBlock ID=\"{id}\" {}/>", attrs(bbox));
            self
        }

        pub fn illustration(mut self, kind: &str, bbox: BoundingBox) -> Self {
            let _ = writeln!(self.body, "<Illustration TYPE=\"{kind}\" {}/>", attrs(bbox));
            self
        }

        pub fn line(mut self, bbox: BoundingBox) -> Self {
            let _ = writeln!(self.body, "<TextLine {}/>", attrs(bbox));
            self
        }

        pub fn word(mut self, content: &str, bbox: BoundingBox) -> Self {
            let _ = writeln!(self.body, "<String CONTENT=\"{content}\" {}/>", attrs(bbox));
            self
        }

        /// A text block with nested lines and words
        pub fn text_block(
            mut self,
            id: &str,
            bbox: BoundingBox,
            lines: &[(BoundingBox, &[(&str, BoundingBox)])],
        ) -> Self {
            let _ = writeln!(self.body, "<TextBlock ID=\"{id}\" {}>", attrs(bbox));
            for (line, words) in lines {
                let _ = writeln!(self.body, "  <TextLine {}>", attrs(*line));
                for (content, word) in *words {
                    let _ = writeln!(
                        self.body,
                        "    <String CONTENT=\"{content}\" {}/>",
                        attrs(*word)
                    );
                }
                self.body.push_str("  </TextLine>\n");
            }
            self.body.push_str("</TextBlock>\n");
            self
        }

        pub fn build(self) -> String {
            let mut page = String::from("<Page ID=\"P1\"");
            if let Some(w) = self.width {
                let _ = write!(page, " WIDTH=\"{w}\"");
            }
            if let Some(h) = self.height {
                let _ = write!(page, " HEIGHT=\"{h}\"");
            }
            format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<alto xmlns=\"{ALTO_NS}\">\n<Layout>{page}>\n<PrintSpace>\n{}</PrintSpace>\n</Page></Layout>\n</alto>\n",
                self.body
            )
        }
    }

    fn attrs(b: BoundingBox) -> String {
        format!(
            "HPOS=\"{}\" VPOS=\"{}\" WIDTH=\"{}\" HEIGHT=\"{}\"",
            b.x, b.y, b.width, b.height
        )
    }

    /// A uniformly gray PNG
    pub fn gray_png(width: u32, height: u32, level: u8) -> Vec<u8> {
        let pixels = vec![level; (width * height) as usize];
        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(&pixels, width, height, ExtendedColorType::L8)
            .unwrap();
        out
    }

    /// Write `<dir>/<stem>_null.xml` and `<dir>/<stem>_null.png`
    pub fn write_page(dir: &Path, stem: &str, alto: &str, raster: &[u8]) -> PagePair {
        fs::create_dir_all(dir).unwrap();
        let pair = PagePair::new(
            dir.join(format!("{stem}_null.xml")),
            dir.join(format!("{stem}_null.png")),
        );
        fs::write(&pair.alto, alto).unwrap();
        fs::write(&pair.raster, raster).unwrap();
        pair
    }

    /// Clock that only moves when told to
    pub struct ManualClock {
        now: Mutex<Instant>,
    }

    impl ManualClock {
        pub fn new() -> Self {
            Self {
                now: Mutex::new(Instant::now()),
            }
        }

        pub fn advance(&self, by: Duration) {
            *self.now.lock().unwrap() += by;
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }
    }
}
