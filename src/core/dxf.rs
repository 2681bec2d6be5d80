//! AutoCAD R2000 (AC1015) ASCII DXF serialization of a [`DrawingDocument`].
//!
//! Only what a parcel drawing needs is emitted: the standard tables, model
//! and paper space blocks, LWPOLYLINE / TEXT / MTEXT / IMAGE entities and
//! the dictionary objects that bind every IMAGE to its IMAGEDEF.

use std::fmt::Display;

use crate::core::drawing::{DrawingDocument, Entity, TEXT_FONT, TEXT_STYLE};

pub const ACAD_VERSION: &str = "AC1015";
/// `$INSUNITS` 6 = meters.
pub const INSUNITS_METERS: i32 = 6;
/// `$MEASUREMENT` 1 = metric.
pub const MEASUREMENT_METRIC: i32 = 1;

/// Window aspect assumed when zooming the active viewport to the extents.
const VIEW_ASPECT: f64 = 1.5;
const VIEW_MARGIN: f64 = 1.05;

/// Plain group-code writer with handle allocation.
pub struct DxfWriter {
    out: String,
    next_handle: u64,
}

impl Default for DxfWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl DxfWriter {
    pub fn new() -> Self {
        Self {
            out: String::with_capacity(16 * 1024),
            // 0x1..0xF 保留給固定 handle
            next_handle: 0x10,
        }
    }

    pub fn allocate_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    pub fn handle_seed(&self) -> u64 {
        self.next_handle
    }

    pub fn pair(&mut self, code: i32, value: impl Display) {
        self.out.push_str(&format!("{:>3}\n{}\n", code, value));
    }

    pub fn text(&mut self, code: i32, value: &str) {
        let escaped = escape_text(value);
        self.pair(code, escaped);
    }

    pub fn real(&mut self, code: i32, value: f64) {
        self.pair(code, format_real(value));
    }

    pub fn handle(&mut self, code: i32, handle: u64) {
        self.pair(code, format!("{:X}", handle));
    }

    /// 2D point at `code`, `code + 10` with z = 0 at `code + 20`.
    pub fn point(&mut self, code: i32, x: f64, y: f64) {
        self.real(code, x);
        self.real(code + 10, y);
        self.real(code + 20, 0.0);
    }

    pub fn begin_section(&mut self, name: &str) {
        self.pair(0, "SECTION");
        self.pair(2, name);
    }

    pub fn end_section(&mut self) {
        self.pair(0, "ENDSEC");
    }

    pub fn finish(mut self) -> String {
        self.pair(0, "EOF");
        self.out
    }
}

/// Shortest decimal that still has a fractional part, e.g. `5.0`, `0.05`.
fn format_real(value: f64) -> String {
    let value = if value == 0.0 { 0.0 } else { value };
    let text = format!("{}", value);
    if text.contains('.') || text.contains("inf") || text.contains("NaN") {
        text
    } else {
        format!("{}.0", text)
    }
}

/// R2000 strings are code-page encoded; non-ASCII goes out as `\U+XXXX`.
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                out.push_str(&format!("\\U+{:04X}", unit));
            }
        }
    }
    out
}

/// Handles known before anything is written, so forward references
/// (owners, IMAGE ↔ IMAGEDEF ↔ reactor) can be emitted in one pass.
struct Handles {
    root_dictionary: u64,
    group_dictionary: u64,
    image_dictionary: u64,
    vport_table: u64,
    ltype_table: u64,
    layer_table: u64,
    style_table: u64,
    view_table: u64,
    ucs_table: u64,
    appid_table: u64,
    dimstyle_table: u64,
    block_record_table: u64,
    model_space: u64,
    paper_space: u64,
    entities: Vec<u64>,
    /// Per image definition: (IMAGEDEF, IMAGEDEF_REACTOR, IMAGE entity).
    images: Vec<(u64, u64, u64)>,
}

impl Handles {
    fn allocate(writer: &mut DxfWriter, doc: &DrawingDocument) -> Self {
        let mut h = Handles {
            root_dictionary: writer.allocate_handle(),
            group_dictionary: writer.allocate_handle(),
            image_dictionary: writer.allocate_handle(),
            vport_table: writer.allocate_handle(),
            ltype_table: writer.allocate_handle(),
            layer_table: writer.allocate_handle(),
            style_table: writer.allocate_handle(),
            view_table: writer.allocate_handle(),
            ucs_table: writer.allocate_handle(),
            appid_table: writer.allocate_handle(),
            dimstyle_table: writer.allocate_handle(),
            block_record_table: writer.allocate_handle(),
            model_space: writer.allocate_handle(),
            paper_space: writer.allocate_handle(),
            entities: Vec::with_capacity(doc.entities().len()),
            images: vec![(0, 0, 0); doc.images().len()],
        };

        for entity in doc.entities() {
            let handle = writer.allocate_handle();
            h.entities.push(handle);
            if let Entity::Image { definition, .. } = entity {
                let definition_handle = writer.allocate_handle();
                let reactor_handle = writer.allocate_handle();
                h.images[*definition] = (definition_handle, reactor_handle, handle);
            }
        }
        h
    }
}

/// Serializes the whole document.
pub fn write_document(doc: &DrawingDocument) -> String {
    let mut w = DxfWriter::new();
    let handles = Handles::allocate(&mut w, doc);

    // HEADER 需要最終的 HANDSEED，所以把其他區段先寫進另一個 writer
    let mut body = DxfWriter {
        out: String::with_capacity(16 * 1024),
        next_handle: w.next_handle,
    };
    write_classes(&mut body);
    write_tables(&mut body, doc, &handles);
    write_blocks(&mut body, &handles);
    write_entities(&mut body, doc, &handles);
    write_objects(&mut body, doc, &handles);

    write_header(&mut w, doc, body.handle_seed());
    w.out.push_str(&body.out);
    w.finish()
}

fn write_header(w: &mut DxfWriter, doc: &DrawingDocument, handle_seed: u64) {
    let ((min_x, min_y), (max_x, max_y)) = doc.extents().unwrap_or(((0.0, 0.0), (0.0, 0.0)));

    w.begin_section("HEADER");
    w.pair(9, "$ACADVER");
    w.pair(1, ACAD_VERSION);
    w.pair(9, "$DWGCODEPAGE");
    w.pair(3, "ANSI_1252");
    w.pair(9, "$HANDSEED");
    w.handle(5, handle_seed);
    w.pair(9, "$INSUNITS");
    w.pair(70, INSUNITS_METERS);
    w.pair(9, "$MEASUREMENT");
    w.pair(70, MEASUREMENT_METRIC);
    w.pair(9, "$EXTMIN");
    w.point(10, min_x, min_y);
    w.pair(9, "$EXTMAX");
    w.point(10, max_x, max_y);
    w.pair(9, "$LIMMIN");
    w.real(10, min_x);
    w.real(20, min_y);
    w.pair(9, "$LIMMAX");
    w.real(10, max_x);
    w.real(20, max_y);
    w.pair(9, "$TEXTSTYLE");
    w.pair(7, TEXT_STYLE);
    w.end_section();
}

fn write_classes(w: &mut DxfWriter) {
    let classes = [
        ("IMAGE", "AcDbRasterImage", 127, 1),
        ("IMAGEDEF", "AcDbRasterImageDef", 0, 0),
        ("IMAGEDEF_REACTOR", "AcDbRasterImageDefReactor", 1, 0),
    ];
    w.begin_section("CLASSES");
    for (dxf_name, cpp_name, flags, is_entity) in classes {
        w.pair(0, "CLASS");
        w.pair(1, dxf_name);
        w.pair(2, cpp_name);
        w.pair(3, "ISM");
        w.pair(90, flags);
        w.pair(280, 0);
        w.pair(281, is_entity);
    }
    w.end_section();
}

fn begin_table(w: &mut DxfWriter, name: &str, handle: u64, count: usize) {
    w.pair(0, "TABLE");
    w.pair(2, name);
    w.handle(5, handle);
    w.pair(330, 0);
    w.pair(100, "AcDbSymbolTable");
    w.pair(70, count);
}

fn begin_record(w: &mut DxfWriter, kind: &str, owner: u64, subclass: &str) {
    let handle = w.allocate_handle();
    w.pair(0, kind);
    w.handle(5, handle);
    w.handle(330, owner);
    w.pair(100, "AcDbSymbolTableRecord");
    w.pair(100, subclass);
}

fn end_table(w: &mut DxfWriter) {
    w.pair(0, "ENDTAB");
}

fn write_tables(w: &mut DxfWriter, doc: &DrawingDocument, h: &Handles) {
    w.begin_section("TABLES");

    write_viewport_table(w, doc, h.vport_table);

    begin_table(w, "LTYPE", h.ltype_table, 3);
    for (name, description) in [("ByBlock", ""), ("ByLayer", ""), ("Continuous", "Solid line")] {
        begin_record(w, "LTYPE", h.ltype_table, "AcDbLinetypeTableRecord");
        w.pair(2, name);
        w.pair(70, 0);
        w.pair(3, description);
        w.pair(72, 65);
        w.pair(73, 0);
        w.real(40, 0.0);
    }
    end_table(w);

    begin_table(w, "LAYER", h.layer_table, doc.layers().len() + 1);
    let default_layer = std::iter::once(("0", 7));
    let layers = doc.layers().iter().map(|l| (l.name.as_str(), l.color));
    for (name, color) in default_layer.chain(layers) {
        begin_record(w, "LAYER", h.layer_table, "AcDbLayerTableRecord");
        w.text(2, name);
        w.pair(70, 0);
        w.pair(62, color);
        w.pair(6, "Continuous");
        w.pair(370, -3);
    }
    end_table(w);

    begin_table(w, "STYLE", h.style_table, 2);
    for (name, font) in [("Standard", "txt"), (TEXT_STYLE, TEXT_FONT)] {
        begin_record(w, "STYLE", h.style_table, "AcDbTextStyleTableRecord");
        w.pair(2, name);
        w.pair(70, 0);
        w.real(40, 0.0);
        w.real(41, 1.0);
        w.real(50, 0.0);
        w.pair(71, 0);
        w.real(42, 2.5);
        w.pair(3, font);
        w.pair(4, "");
    }
    end_table(w);

    begin_table(w, "VIEW", h.view_table, 0);
    end_table(w);
    begin_table(w, "UCS", h.ucs_table, 0);
    end_table(w);

    begin_table(w, "APPID", h.appid_table, 1);
    begin_record(w, "APPID", h.appid_table, "AcDbRegAppTableRecord");
    w.pair(2, "ACAD");
    w.pair(70, 0);
    end_table(w);

    begin_table(w, "DIMSTYLE", h.dimstyle_table, 0);
    w.pair(100, "AcDbDimStyleTable");
    w.pair(71, 0);
    end_table(w);

    begin_table(w, "BLOCK_RECORD", h.block_record_table, 2);
    for (name, handle) in [("*Model_Space", h.model_space), ("*Paper_Space", h.paper_space)] {
        w.pair(0, "BLOCK_RECORD");
        w.handle(5, handle);
        w.handle(330, h.block_record_table);
        w.pair(100, "AcDbSymbolTableRecord");
        w.pair(100, "AcDbBlockTableRecord");
        w.pair(2, name);
        w.pair(340, 0);
    }
    end_table(w);

    w.end_section();
}

/// `*Active` viewport centred on the drawing extents (zoom to extents).
fn write_viewport_table(w: &mut DxfWriter, doc: &DrawingDocument, table: u64) {
    let ((min_x, min_y), (max_x, max_y)) = doc.extents().unwrap_or(((0.0, 0.0), (10.0, 10.0)));
    let center_x = (min_x + max_x) / 2.0;
    let center_y = (min_y + max_y) / 2.0;
    let height = (max_y - min_y).max((max_x - min_x) / VIEW_ASPECT).max(1.0) * VIEW_MARGIN;

    begin_table(w, "VPORT", table, 1);
    begin_record(w, "VPORT", table, "AcDbViewportTableRecord");
    w.pair(2, "*Active");
    w.pair(70, 0);
    w.real(10, 0.0);
    w.real(20, 0.0);
    w.real(11, 1.0);
    w.real(21, 1.0);
    w.real(12, center_x);
    w.real(22, center_y);
    w.real(13, 0.0);
    w.real(23, 0.0);
    w.real(14, 10.0);
    w.real(24, 10.0);
    w.real(15, 10.0);
    w.real(25, 10.0);
    w.real(16, 0.0);
    w.real(26, 0.0);
    w.real(36, 1.0);
    w.real(17, 0.0);
    w.real(27, 0.0);
    w.real(37, 0.0);
    w.real(40, height);
    w.real(41, VIEW_ASPECT);
    w.real(42, 50.0);
    w.real(43, 0.0);
    w.real(44, 0.0);
    w.real(50, 0.0);
    w.real(51, 0.0);
    w.pair(71, 0);
    w.pair(72, 1000);
    w.pair(73, 1);
    w.pair(74, 3);
    w.pair(75, 0);
    w.pair(76, 0);
    w.pair(77, 0);
    w.pair(78, 0);
    end_table(w);
}

fn write_blocks(w: &mut DxfWriter, h: &Handles) {
    w.begin_section("BLOCKS");
    for (name, owner) in [("*Model_Space", h.model_space), ("*Paper_Space", h.paper_space)] {
        let begin = w.allocate_handle();
        w.pair(0, "BLOCK");
        w.handle(5, begin);
        w.handle(330, owner);
        w.pair(100, "AcDbEntity");
        w.pair(8, "0");
        w.pair(100, "AcDbBlockBegin");
        w.pair(2, name);
        w.pair(70, 0);
        w.point(10, 0.0, 0.0);
        w.pair(3, name);
        w.pair(1, "");

        let end = w.allocate_handle();
        w.pair(0, "ENDBLK");
        w.handle(5, end);
        w.handle(330, owner);
        w.pair(100, "AcDbEntity");
        w.pair(8, "0");
        w.pair(100, "AcDbBlockEnd");
    }
    w.end_section();
}

fn entity_header(w: &mut DxfWriter, kind: &str, handle: u64, owner: u64, layer: &str) {
    w.pair(0, kind);
    w.handle(5, handle);
    w.handle(330, owner);
    w.pair(100, "AcDbEntity");
    w.text(8, layer);
}

fn write_entities(w: &mut DxfWriter, doc: &DrawingDocument, h: &Handles) {
    w.begin_section("ENTITIES");
    for (entity, &handle) in doc.entities().iter().zip(&h.entities) {
        match entity {
            Entity::Boundary { layer, vertices } => {
                entity_header(w, "LWPOLYLINE", handle, h.model_space, layer);
                w.pair(100, "AcDbPolyline");
                w.pair(90, vertices.len());
                // 70 = 1: closed
                w.pair(70, 1);
                w.real(43, 0.0);
                for (x, y) in vertices {
                    w.real(10, *x);
                    w.real(20, *y);
                }
            }
            Entity::Label {
                layer,
                position,
                height,
                text,
            } => {
                entity_header(w, "TEXT", handle, h.model_space, layer);
                w.pair(100, "AcDbText");
                w.point(10, position.0, position.1);
                w.real(40, *height);
                w.text(1, text);
                w.pair(7, TEXT_STYLE);
                // middle-centre: 72 = 1 (center), 73 = 2 (middle)
                w.pair(72, 1);
                w.point(11, position.0, position.1);
                w.pair(100, "AcDbText");
                w.pair(73, 2);
            }
            Entity::AttributeBlock {
                layer,
                insert,
                height,
                lines,
            } => {
                entity_header(w, "MTEXT", handle, h.model_space, layer);
                w.pair(100, "AcDbMText");
                w.point(10, insert.0, insert.1);
                w.real(40, *height);
                w.real(41, 0.0);
                // 71 = 1: top left
                w.pair(71, 1);
                w.pair(72, 1);
                write_mtext_content(w, lines);
                w.pair(7, TEXT_STYLE);
            }
            Entity::Image {
                layer,
                definition,
                insert,
                u_vector,
                v_vector,
                size,
                display_flags,
            } => {
                let (definition_handle, reactor_handle, _) = h.images[*definition];
                let (width, height) = (f64::from(size.width), f64::from(size.height));

                entity_header(w, "IMAGE", handle, h.model_space, layer);
                w.pair(100, "AcDbRasterImage");
                w.pair(90, 0);
                w.point(10, insert.0, insert.1);
                w.point(11, u_vector.0, u_vector.1);
                w.point(12, v_vector.0, v_vector.1);
                w.real(13, width);
                w.real(23, height);
                w.handle(340, definition_handle);
                w.pair(70, display_flags);
                w.pair(280, 0);
                w.pair(281, 50);
                w.pair(282, 50);
                w.pair(283, 0);
                w.handle(360, reactor_handle);
                // 矩形裁切框，單位為像素
                w.pair(71, 1);
                w.pair(91, 2);
                w.real(14, -0.5);
                w.real(24, -0.5);
                w.real(14, width - 0.5);
                w.real(24, height - 0.5);
            }
        }
    }
    w.end_section();
}

/// MTEXT content: `\P` paragraph breaks, split into 250-char chunks where
/// all but the last go out as group code 3.
fn write_mtext_content(w: &mut DxfWriter, lines: &[String]) {
    let content = lines
        .iter()
        .map(|line| escape_text(&line.replace('\\', "\\\\")))
        .collect::<Vec<_>>()
        .join("\\P");

    let chars: Vec<char> = content.chars().collect();
    let chunks: Vec<String> = chars.chunks(250).map(|c| c.iter().collect()).collect();
    let last = chunks.len().saturating_sub(1);
    for (i, chunk) in chunks.iter().enumerate() {
        let code = if i == last { 1 } else { 3 };
        w.pair(code, chunk);
    }
    if chunks.is_empty() {
        w.pair(1, "");
    }
}

fn write_objects(w: &mut DxfWriter, doc: &DrawingDocument, h: &Handles) {
    w.begin_section("OBJECTS");

    w.pair(0, "DICTIONARY");
    w.handle(5, h.root_dictionary);
    w.pair(330, 0);
    w.pair(100, "AcDbDictionary");
    w.pair(281, 1);
    w.pair(3, "ACAD_GROUP");
    w.handle(350, h.group_dictionary);
    w.pair(3, "ACAD_IMAGE_DICT");
    w.handle(350, h.image_dictionary);

    w.pair(0, "DICTIONARY");
    w.handle(5, h.group_dictionary);
    w.handle(330, h.root_dictionary);
    w.pair(100, "AcDbDictionary");
    w.pair(281, 1);

    w.pair(0, "DICTIONARY");
    w.handle(5, h.image_dictionary);
    w.handle(330, h.root_dictionary);
    w.pair(100, "AcDbDictionary");
    w.pair(281, 1);
    for (image, &(definition_handle, _, _)) in doc.images().iter().zip(&h.images) {
        w.text(3, &image.name);
        w.handle(350, definition_handle);
    }

    for (image, &(definition_handle, reactor_handle, image_handle)) in
        doc.images().iter().zip(&h.images)
    {
        w.pair(0, "IMAGEDEF");
        w.handle(5, definition_handle);
        w.pair(102, "{ACAD_REACTORS");
        w.handle(330, reactor_handle);
        w.pair(102, "}");
        w.handle(330, h.image_dictionary);
        w.pair(100, "AcDbRasterImageDef");
        w.pair(90, 0);
        w.text(1, &image.file_name);
        w.real(10, f64::from(image.size.width));
        w.real(20, f64::from(image.size.height));
        w.real(11, image.pixel_world_size.0);
        w.real(21, image.pixel_world_size.1);
        // 280 = 1: loaded, 281 = 0: no units
        w.pair(280, 1);
        w.pair(281, 0);

        w.pair(0, "IMAGEDEF_REACTOR");
        w.handle(5, reactor_handle);
        w.handle(330, image_handle);
        w.pair(100, "AcDbRasterImageDefReactor");
        w.pair(90, 2);
        w.handle(330, image_handle);
    }

    w.end_section();
}
