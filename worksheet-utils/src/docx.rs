//! WordprocessingML rendering of worksheets and question banks.
//!
//! Every table cell ends with a paragraph and every nested table is followed
//! by one, which keeps Word and LibreOffice from merging neighbouring tables.
//! Right-to-left paragraphs use the `Rtl` paragraph style, whose `w:bidi`
//! property is added to `word/styles.xml` after packing.
use std::io::{Cursor, Read, Write};

use docx_rs::{
    AlignmentType, BorderType, BreakType, Docx, LineSpacing, PageMargin, Paragraph, Run,
    RunFonts, Shading, ShdType, Style, StyleType, Table, TableAlignmentType, TableCell,
    TableCellBorder, TableCellBorderPosition, TableRow, WidthType,
};
use quick_xml::{
    Reader, Writer,
    events::{BytesEnd, BytesStart, Event},
};
use tracing::{debug, warn};
use zip::{CompressionMethod, ZipArchive, ZipWriter, write::SimpleFileOptions};

use crate::{
    build::{ESSAY_HEADER, Generated, HeaderConfig, MULTIPLE_CHOICE_HEADER, Sidebar},
    error::Error,
    question::Question,
    text::{Direction, arabic_indic_number, detect_direction, shape_run},
};

const DXA_PER_INCH: f64 = 1440.0;

const PAGE_WIDTH_IN: f64 = 7.9;
const MAIN_WIDTH_IN: f64 = 6.0;
const SIDEBAR_WIDTH_IN: f64 = 1.9;
const HEADER_CELL_WIDTH_IN: f64 = 2.0;
const NAME_CLASS_CELL_WIDTH_IN: f64 = 4.0;

// US Letter, margins 0.4in top/bottom and 0.3in left/right
const PAGE_WIDTH_DXA: u32 = 12240;
const PAGE_HEIGHT_DXA: u32 = 15840;
const PAGE_MARGIN_TOP_DXA: i32 = 576;
const PAGE_MARGIN_SIDE_DXA: i32 = 432;
const PAGE_HEADER_DXA: i32 = 720;

/// Eighths of a point
const DASHED_BORDER_SIZE: usize = 10;
const FULL_WIDTH_PCT: usize = 5000;

const DEFAULT_FONT: &str = "Arial";
const DEFAULT_SIZE_HALF_PT: usize = 22;

const RTL_STYLE: &str = "Rtl";
const RTL_STYLE_NAME: &str = "Right To Left";
const STYLES_PART: &str = "word/styles.xml";

mod color {
    pub const DARK_NAVY: &str = "343F55";
    pub const YELLOW_HIGHLIGHT: &str = "FFFF66";
    pub const GREEN_LEVEL: &str = "90EE90";
    pub const ORANGE_LEVEL: &str = "FFC87C";
    pub const RED_LEVEL: &str = "FFA0A0";
    pub const ANSWER_RED: &str = "FF0000";
    pub const LIGHT_GRAY: &str = "F5F5F5";
    pub const BORDER_GRAY: &str = "B4B4B4";
    pub const WHITE: &str = "FFFFFF";
    pub const TEXT_BLUE: &str = "283750";
    /// Named highlight closest to the navy theme
    pub const NUMBER_HIGHLIGHT: &str = "darkBlue";
}

mod font {
    pub const HEADER_DARK: usize = 11;
    pub const HEADER_LIGHT: usize = 12;
    pub const TITLE: usize = 16;
    pub const SECTION_HEADER: usize = 13;
    pub const QUESTION_NUMBER: usize = 12;
    pub const QUESTION_TEXT: usize = 12;
    pub const CHOICE_LABEL: usize = 10;
    pub const CHOICE_TEXT: usize = 10;
    pub const SIDEBAR_ITEM: usize = 9;
    pub const ESSAY_ANSWER: usize = 10;
    pub const LEVEL_TEXT: usize = 11;
}

const SECTION_ICON: &str = "⚙ ";
const ANSWER_PREFIX: &str = "الإجابة: ";
const CHOICE_SEPARATOR: &str = " - ";
const UNDERLINE: &str = "_";
const UNDERLINE_COUNT: usize = 100;
const CHOICE_COLUMNS: usize = 2;

const BEFORE_LESSON_TITLE: &str = "ما قبل الدرس";
const GOALS_TITLE: &str = "أهداف الدرس";
const APPLICATIONS_TITLE: &str = "تطبيقات الدرس";
const LEVELS_TITLE: &str = "مستويات الاتقان";
const NOTES_TITLE: &str = "ملاحظات المعلم";
const GOALS_BULLET: &str = "✓ ";
const LEVELS_BULLET: &str = "〇 \t";
const NOTES_LINES: usize = 3;

const LEVEL_COLORS: [&str; 3] = [color::GREEN_LEVEL, color::ORANGE_LEVEL, color::RED_LEVEL];
const ABJAD: [&str; 10] = ["أ", "ب", "ج", "د", "هـ", "و", "ز", "ح", "ط", "ي"];

fn inches(value: f64) -> usize {
    (value * DXA_PER_INCH).round() as usize
}

/// How choices are labelled inside the choice grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChoiceNumbering {
    /// ١ ٢ ٣ ٤
    #[default]
    Numbers,
    /// أ ب ج د
    Symbols,
}

impl ChoiceNumbering {
    fn label(self, index: usize) -> String {
        match self {
            ChoiceNumbering::Numbers => arabic_indic_number(index + 1),
            ChoiceNumbering::Symbols => match ABJAD.get(index) {
                Some(letter) => letter.to_string(),
                None => arabic_indic_number(index + 1),
            },
        }
    }
}

#[derive(Clone, Debug)]
pub struct RenderOptions {
    pub numbering: ChoiceNumbering,
    pub answer_lines: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            numbering: ChoiceNumbering::Numbers,
            answer_lines: 5,
        }
    }
}

/// Formatting of one run before the paragraph direction is known.
struct Span<'a> {
    text: &'a str,
    size_pt: usize,
    bold: bool,
    color: Option<&'a str>,
    highlight: Option<&'a str>,
}

impl<'a> Span<'a> {
    fn new(text: &'a str, size_pt: usize) -> Self {
        Span {
            text,
            size_pt,
            bold: false,
            color: None,
            highlight: None,
        }
    }

    fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    fn color(mut self, color: &'a str) -> Self {
        self.color = Some(color);
        self
    }

    fn highlight(mut self, highlight: &'a str) -> Self {
        self.highlight = Some(highlight);
        self
    }

    fn into_run(self, paragraph: Direction) -> Run {
        let mut run = Run::new().size(self.size_pt * 2);
        if self.bold {
            run = run.bold();
        }
        if let Some(color) = self.color {
            run = run.color(color);
        }
        if let Some(highlight) = self.highlight {
            run = run.highlight(highlight);
        }

        let shaped = shape_run(self.text, paragraph);
        for (i, line) in shaped.split('\n').enumerate() {
            if i > 0 {
                run = run.add_break(BreakType::TextWrapping);
            }
            for (j, part) in line.split('\t').enumerate() {
                if j > 0 {
                    run = run.add_tab();
                }
                if !part.is_empty() {
                    run = run.add_text(strip_control(part));
                }
            }
        }
        run
    }
}

/// Characters XML 1.0 cannot carry
fn strip_control(text: &str) -> String {
    text.chars().filter(|c| !c.is_control()).collect()
}

fn tight() -> LineSpacing {
    LineSpacing::new().before(0).after(0)
}

/// Paragraph whose direction follows its content. Text without strong
/// characters is treated as right-to-left.
fn paragraph(align: AlignmentType, spans: Vec<Span>) -> Paragraph {
    let text: String = spans.iter().map(|s| s.text).collect();
    let direction = match detect_direction(&text) {
        Direction::Ltr => Direction::Ltr,
        Direction::Neutral => Direction::Rtl,
        other => other,
    };

    let mut p = Paragraph::new().align(align).line_spacing(tight());
    if direction.is_right_to_left() {
        p = p.style(RTL_STYLE);
    }
    spans
        .into_iter()
        .fold(p, |p, span| p.add_run(span.into_run(direction)))
}

fn empty_paragraph() -> Paragraph {
    Paragraph::new().style(RTL_STYLE).line_spacing(tight())
}

enum Block {
    Paragraph(Paragraph),
    Table(Table),
}

/// Body content of the document or of one table cell.
#[derive(Default)]
struct Blocks {
    items: Vec<Block>,
}

impl Blocks {
    fn paragraph(&mut self, p: Paragraph) {
        self.items.push(Block::Paragraph(p));
    }

    fn table(&mut self, t: Table) {
        self.items.push(Block::Table(t));
        self.paragraph(empty_paragraph());
    }

    fn into_cell(mut self) -> TableCell {
        if self.items.is_empty() {
            self.paragraph(empty_paragraph());
        }
        self.items
            .into_iter()
            .fold(TableCell::new(), |cell, block| match block {
                Block::Paragraph(p) => cell.add_paragraph(p),
                Block::Table(t) => cell.add_table(t),
            })
    }

    fn into_docx(self, docx: Docx) -> Docx {
        self.items.into_iter().fold(docx, |docx, block| match block {
            Block::Paragraph(p) => docx.add_paragraph(p),
            Block::Table(t) => docx.add_table(t),
        })
    }
}

fn cell(p: Paragraph) -> TableCell {
    TableCell::new().add_paragraph(p)
}

fn shaded(cell: TableCell, fill: &str) -> TableCell {
    cell.shading(
        Shading::new()
            .shd_type(ShdType::Clear)
            .color("auto")
            .fill(fill),
    )
}

fn dashed(cell: TableCell, color: &str) -> TableCell {
    [
        TableCellBorderPosition::Top,
        TableCellBorderPosition::Left,
        TableCellBorderPosition::Bottom,
        TableCellBorderPosition::Right,
    ]
    .into_iter()
    .fold(cell, |cell, position| {
        cell.set_border(
            TableCellBorder::new(position)
                .border_type(BorderType::Dashed)
                .size(DASHED_BORDER_SIZE)
                .color(color),
        )
    })
}

/// Borderless table. `grid` holds the column widths.
fn table(
    align: TableAlignmentType,
    full_width: bool,
    grid: Vec<usize>,
    rows: Vec<Vec<TableCell>>,
) -> Table {
    let rows = rows.into_iter().map(TableRow::new).collect();
    let table = Table::new(rows)
        .set_grid(grid)
        .align(align)
        .clear_all_border();
    if full_width {
        table.width(FULL_WIDTH_PCT, WidthType::Pct)
    } else {
        table
    }
}

/// Single-cell box spanning `column`.
fn boxed(out: &mut Blocks, align: TableAlignmentType, column: usize, cell: TableCell) {
    out.table(table(align, true, vec![column], vec![vec![cell]]));
}

fn render_info_header(out: &mut Blocks, header: &HeaderConfig) {
    let side = inches(HEADER_CELL_WIDTH_IN);
    let middle = inches(NAME_CLASS_CELL_WIDTH_IN);

    let dark = |text: &str| {
        let p = paragraph(
            AlignmentType::Center,
            vec![Span::new(text, font::HEADER_DARK).bold().color(color::WHITE)],
        );
        shaded(cell(p), color::DARK_NAVY).width(side, WidthType::Dxa)
    };
    let light = |text: &str| {
        let p = paragraph(
            AlignmentType::Right,
            vec![Span::new(text, font::HEADER_LIGHT).bold().color(color::TEXT_BLUE)],
        );
        let c = shaded(cell(p), color::LIGHT_GRAY).width(middle, WidthType::Dxa);
        dashed(c, color::BORDER_GRAY)
    };

    let rows = vec![
        vec![
            dark(&header.subject_memo),
            light(&header.name_label),
            dark(&header.semester),
        ],
        vec![
            dark(&header.worksheet_number),
            light(&header.class_label),
            dark(&header.grade),
        ],
    ];
    out.table(table(
        TableAlignmentType::Center,
        false,
        vec![side, middle, side],
        rows,
    ));
}

fn render_title(out: &mut Blocks, title: &str) {
    if title.is_empty() {
        return;
    }
    out.paragraph(paragraph(
        AlignmentType::Center,
        vec![Span::new(title, font::TITLE).bold().color(color::DARK_NAVY)],
    ));
}

fn render_section_header(out: &mut Blocks, column: usize, header: &str) {
    let text = format!("{SECTION_ICON}{header}");
    let p = paragraph(
        AlignmentType::Center,
        vec![Span::new(&text, font::SECTION_HEADER).bold().color(color::WHITE)],
    );
    boxed(
        out,
        TableAlignmentType::Right,
        column,
        shaded(cell(p), color::DARK_NAVY),
    );
}

fn question_heading(number: usize, text: &str) -> Paragraph {
    let number = format!(" {} ", arabic_indic_number(number));
    let text = format!("  {text}");
    paragraph(
        AlignmentType::Right,
        vec![
            Span::new(&number, font::QUESTION_NUMBER)
                .bold()
                .color(color::WHITE)
                .highlight(color::NUMBER_HIGHLIGHT),
            Span::new(&text, font::QUESTION_TEXT).color(color::TEXT_BLUE),
        ],
    )
}

fn choice_cell(label: &str, choice: &str, correct: bool) -> TableCell {
    let mut choice = Span::new(choice, font::CHOICE_TEXT).color(color::TEXT_BLUE);
    if correct {
        choice = choice.bold();
    }
    let p = paragraph(
        AlignmentType::Center,
        vec![
            Span::new(label, font::CHOICE_LABEL).bold().color(color::TEXT_BLUE),
            choice,
        ],
    );
    let fill = if correct {
        color::YELLOW_HIGHLIGHT
    } else {
        color::LIGHT_GRAY
    };
    shaded(cell(p), fill)
}

struct Numbered<'a> {
    number: usize,
    column: usize,
    options: &'a RenderOptions,
}

fn render_choice_question(
    out: &mut Blocks,
    at: &Numbered,
    text: &str,
    choices: &[String],
    answer_key: Option<usize>,
) {
    let mut body = Blocks::default();
    body.paragraph(question_heading(at.number, text));

    if !choices.is_empty() {
        let rows = choices
            .chunks(CHOICE_COLUMNS)
            .enumerate()
            .map(|(row_index, row)| {
                let mut cells: Vec<TableCell> = row
                    .iter()
                    .enumerate()
                    .map(|(col, choice)| {
                        let index = row_index * CHOICE_COLUMNS + col;
                        let label =
                            format!("{}{CHOICE_SEPARATOR}", at.options.numbering.label(index));
                        choice_cell(&label, choice, answer_key == Some(index))
                    })
                    .collect();
                while cells.len() < CHOICE_COLUMNS {
                    cells.push(cell(empty_paragraph()));
                }
                // First choice sits on the right
                cells.reverse();
                cells
            })
            .collect();
        let grid = vec![at.column / CHOICE_COLUMNS; CHOICE_COLUMNS];
        body.table(table(TableAlignmentType::Center, true, grid, rows));
    }

    boxed(
        out,
        TableAlignmentType::Left,
        at.column,
        dashed(body.into_cell(), color::DARK_NAVY),
    );
}

fn render_essay_question(out: &mut Blocks, at: &Numbered, text: &str, answer: Option<&str>) {
    let mut body = Blocks::default();
    body.paragraph(question_heading(at.number, text));

    if let Some(answer) = answer.filter(|a| !a.is_empty()) {
        let answer = format!("{ANSWER_PREFIX}{answer}");
        body.paragraph(paragraph(
            AlignmentType::Right,
            vec![
                Span::new(&answer, font::ESSAY_ANSWER)
                    .bold()
                    .color(color::ANSWER_RED),
            ],
        ));
    }

    let line = UNDERLINE.repeat(UNDERLINE_COUNT);
    for _ in 0..at.options.answer_lines {
        body.paragraph(paragraph(
            AlignmentType::Center,
            vec![Span::new(&line, font::CHOICE_TEXT)],
        ));
    }

    let c = shaded(body.into_cell(), color::LIGHT_GRAY);
    boxed(
        out,
        TableAlignmentType::Left,
        at.column,
        dashed(c, color::DARK_NAVY),
    );
}

/// Choice questions first, then written ones, numbered continuously.
fn render_questions(
    out: &mut Blocks,
    column: usize,
    choice_header: &str,
    choice: &[&Question],
    essay_header: &str,
    essay: &[&Question],
    options: &RenderOptions,
) {
    let mut at = Numbered {
        number: 1,
        column,
        options,
    };

    if !choice.is_empty() {
        render_section_header(out, column, choice_header);
        for question in choice {
            match question {
                Question::Choice(q) => {
                    render_choice_question(out, &at, &q.question, &q.choices, q.answer_key)
                }
                Question::Written(q) => {
                    warn!(question = %q.question, "written question in the choice section");
                    render_essay_question(out, &at, &q.question, q.answer.as_deref())
                }
            }
            at.number += 1;
        }
    }

    if !essay.is_empty() {
        render_section_header(out, column, essay_header);
        for question in essay {
            match question {
                Question::Written(q) => {
                    render_essay_question(out, &at, &q.question, q.answer.as_deref())
                }
                Question::Choice(q) => render_essay_question(out, &at, &q.question, None),
            }
            at.number += 1;
        }
    }
}

fn sidebar_section(out: &mut Blocks, column: usize, title: &str, content: &str) {
    let header = paragraph(
        AlignmentType::Center,
        vec![Span::new(title, font::HEADER_LIGHT).bold().color(color::WHITE)],
    );
    boxed(
        out,
        TableAlignmentType::Center,
        column,
        shaded(cell(header), color::DARK_NAVY),
    );

    if !content.is_empty() {
        let body = paragraph(
            AlignmentType::Center,
            vec![Span::new(content, font::CHOICE_TEXT).color(color::TEXT_BLUE)],
        );
        let c = shaded(cell(body), color::LIGHT_GRAY);
        boxed(
            out,
            TableAlignmentType::Center,
            column,
            dashed(c, color::BORDER_GRAY),
        );
    }
}

fn sidebar_item(out: &mut Blocks, column: usize, text: &str, bordered: bool) {
    let text = format!("{GOALS_BULLET}{text}");
    let body = paragraph(
        AlignmentType::Center,
        vec![Span::new(&text, font::SIDEBAR_ITEM).color(color::TEXT_BLUE)],
    );
    let c = shaded(cell(body), color::LIGHT_GRAY);
    let c = if bordered {
        dashed(c, color::BORDER_GRAY)
    } else {
        c
    };
    boxed(out, TableAlignmentType::Center, column, c);
}

fn render_sidebar(out: &mut Blocks, sidebar: &Sidebar) {
    let column = inches(SIDEBAR_WIDTH_IN);

    sidebar_section(out, column, BEFORE_LESSON_TITLE, &sidebar.before_lesson);

    sidebar_section(out, column, GOALS_TITLE, "");
    for goal in &sidebar.goal {
        sidebar_item(out, column, goal, true);
    }

    sidebar_section(out, column, APPLICATIONS_TITLE, "");
    for application in &sidebar.application {
        sidebar_item(out, column, application, false);
    }

    sidebar_section(out, column, LEVELS_TITLE, "");
    for (level, fill) in sidebar.level.iter().zip(LEVEL_COLORS.iter().cycle()) {
        let text = format!("{LEVELS_BULLET}{level}");
        let body = paragraph(
            AlignmentType::Center,
            vec![Span::new(&text, font::LEVEL_TEXT).bold().color(color::TEXT_BLUE)],
        );
        boxed(
            out,
            TableAlignmentType::Center,
            column,
            dashed(shaded(cell(body), fill), fill),
        );
    }

    sidebar_section(out, column, NOTES_TITLE, "");
    let mut notes = Blocks::default();
    if !sidebar.notice.is_empty() {
        notes.paragraph(paragraph(
            AlignmentType::Right,
            vec![Span::new(&sidebar.notice, font::CHOICE_TEXT).color(color::TEXT_BLUE)],
        ));
    }
    for _ in 0..NOTES_LINES {
        notes.paragraph(empty_paragraph());
    }
    let c = shaded(notes.into_cell(), color::LIGHT_GRAY);
    boxed(
        out,
        TableAlignmentType::Center,
        column,
        dashed(c, color::BORDER_GRAY),
    );
}

fn document_body(generated: &Generated, options: &RenderOptions) -> Result<Blocks, Error> {
    if generated.question_count() == 0 {
        return Err(Error::Validation(
            "at least one question must be provided".to_string(),
        ));
    }

    let mut body = Blocks::default();
    render_info_header(&mut body, generated.header_config());
    render_title(&mut body, generated.title());

    let mut main = Blocks::default();
    match generated {
        Generated::Worksheet(ws) => {
            let main_width = inches(MAIN_WIDTH_IN);
            let choice: Vec<&Question> = ws.multiple_choice.questions.iter().collect();
            let essay: Vec<&Question> = ws.essay.questions.iter().collect();
            render_questions(
                &mut main,
                main_width,
                &ws.multiple_choice.header,
                &choice,
                &ws.essay.header,
                &essay,
                options,
            );

            match &ws.sidebar {
                Some(sidebar) => {
                    let side_width = inches(SIDEBAR_WIDTH_IN);
                    let mut side = Blocks::default();
                    render_sidebar(&mut side, sidebar);
                    body.table(table(
                        TableAlignmentType::Center,
                        false,
                        vec![main_width, side_width],
                        vec![vec![
                            main.into_cell().width(main_width, WidthType::Dxa),
                            side.into_cell().width(side_width, WidthType::Dxa),
                        ]],
                    ));
                }
                None => body.table(table(
                    TableAlignmentType::Center,
                    false,
                    vec![main_width],
                    vec![vec![main.into_cell().width(main_width, WidthType::Dxa)]],
                )),
            }
        }
        Generated::QuestionBank(bank) => {
            let width = inches(PAGE_WIDTH_IN);
            let (choice, essay): (Vec<&Question>, Vec<&Question>) = bank
                .questions
                .iter()
                .partition(|q| matches!(q, Question::Choice(c) if !c.choices.is_empty()));
            render_questions(
                &mut main,
                width,
                MULTIPLE_CHOICE_HEADER,
                &choice,
                ESSAY_HEADER,
                &essay,
                options,
            );
            body.table(table(
                TableAlignmentType::Center,
                false,
                vec![width],
                vec![vec![main.into_cell().width(width, WidthType::Dxa)]],
            ));
        }
    }

    Ok(body)
}

fn document(body: Blocks) -> Docx {
    let docx = Docx::new()
        .page_size(PAGE_WIDTH_DXA, PAGE_HEIGHT_DXA)
        .page_margin(
            PageMargin::new()
                .top(PAGE_MARGIN_TOP_DXA)
                .bottom(PAGE_MARGIN_TOP_DXA)
                .left(PAGE_MARGIN_SIDE_DXA)
                .right(PAGE_MARGIN_SIDE_DXA)
                .header(PAGE_HEADER_DXA)
                .footer(PAGE_HEADER_DXA)
                .gutter(0),
        )
        .default_fonts(
            RunFonts::new()
                .ascii(DEFAULT_FONT)
                .hi_ansi(DEFAULT_FONT)
                .east_asia(DEFAULT_FONT)
                .cs(DEFAULT_FONT),
        )
        .default_size(DEFAULT_SIZE_HALF_PT)
        .add_style(Style::new(RTL_STYLE, StyleType::Paragraph).name(RTL_STYLE_NAME));
    body.into_docx(docx)
}

/// Renders a complete `.docx` package in memory.
pub fn render_docx(generated: &Generated, options: &RenderOptions) -> Result<Vec<u8>, Error> {
    let body = document_body(generated, options)?;

    let mut packed = Cursor::new(Vec::new());
    document(body)
        .build()
        .pack(&mut packed)
        .map_err(|e| Error::Docx(e.to_string()))?;
    let bytes = with_bidi_style(packed.into_inner())?;

    debug!(
        title = generated.title(),
        questions = generated.question_count(),
        "rendered docx"
    );
    Ok(bytes)
}

/// Copies the package, rewriting the styles part.
fn with_bidi_style(package: Vec<u8>) -> Result<Vec<u8>, Error> {
    let mut archive = ZipArchive::new(Cursor::new(package))?;
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for i in 0..archive.len() {
        let mut part = archive.by_index(i)?;
        let name = part.name().to_string();
        let mut content = Vec::new();
        part.read_to_end(&mut content)?;
        if name == STYLES_PART {
            content = bidi_styles(&content)?;
        }
        zip.start_file(name, options)?;
        zip.write_all(&content)?;
    }

    Ok(zip.finish()?.into_inner())
}

/// Gives the `Rtl` paragraph style a `<w:pPr><w:bidi/></w:pPr>`, replacing
/// whatever paragraph properties it had. Other styles pass through untouched.
fn bidi_styles(xml: &[u8]) -> Result<Vec<u8>, Error> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::new());
    let mut in_rtl = false;
    let mut written = false;

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) if e.name().as_ref() == b"w:style" => {
                in_rtl = has_style_id(&e, RTL_STYLE);
                written = false;
                writer.write_event(Event::Start(e))?;
            }
            Event::Start(e) if in_rtl && e.name().as_ref() == b"w:pPr" => {
                reader.read_to_end(e.name())?;
                write_bidi_properties(&mut writer, &mut written)?;
            }
            Event::Empty(e) if in_rtl && e.name().as_ref() == b"w:pPr" => {
                write_bidi_properties(&mut writer, &mut written)?;
            }
            Event::Start(e) if in_rtl && follows_paragraph_properties(&e) => {
                write_bidi_properties(&mut writer, &mut written)?;
                writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) if in_rtl && follows_paragraph_properties(&e) => {
                write_bidi_properties(&mut writer, &mut written)?;
                writer.write_event(Event::Empty(e))?;
            }
            Event::End(e) if in_rtl && e.name().as_ref() == b"w:style" => {
                write_bidi_properties(&mut writer, &mut written)?;
                in_rtl = false;
                writer.write_event(Event::End(e))?;
            }
            event => writer.write_event(event)?,
        }
    }

    Ok(writer.into_inner())
}

fn has_style_id(e: &BytesStart, id: &str) -> bool {
    matches!(
        e.try_get_attribute("w:styleId"),
        Ok(Some(attr)) if attr.value.as_ref() == id.as_bytes()
    )
}

/// Style children that must come after `w:pPr`
fn follows_paragraph_properties(e: &BytesStart) -> bool {
    matches!(
        e.name().as_ref(),
        b"w:rPr" | b"w:tblPr" | b"w:trPr" | b"w:tcPr" | b"w:tblStylePr"
    )
}

fn write_bidi_properties(writer: &mut Writer<Vec<u8>>, written: &mut bool) -> Result<(), Error> {
    if *written {
        return Ok(());
    }
    writer.write_event(Event::Start(BytesStart::new("w:pPr")))?;
    writer.write_event(Event::Empty(BytesStart::new("w:bidi")))?;
    writer.write_event(Event::End(BytesEnd::new("w:pPr")))?;
    *written = true;
    Ok(())
}
