use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use crate::error::ParseError;
use crate::score::{
    KeyMode, KeySignature, Measure, ParsedScore, Part, ScoreNote, TempoMark, TimeSignature,
};

/// MIDI number for a diatonic step, chromatic alteration and octave.
pub fn midi_from_pitch(step: char, alter: i32, octave: i32) -> Result<u8, ParseError> {
    let base = match step {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return Err(ParseError::invalid("step", step.to_string())),
    };
    let midi = (octave + 1) * 12 + base + alter;
    u8::try_from(midi)
        .ok()
        .filter(|m| *m <= 127)
        .ok_or(ParseError::PitchOutOfRange {
            step,
            alter,
            octave,
        })
}

/// Parses a partwise MusicXML document. Any markup error aborts the parse.
pub fn parse_musicxml(xml: &str) -> Result<ParsedScore, ParseError> {
    ScoreParser::default().parse(xml)
}

#[derive(Default)]
struct NoteBuilder {
    rest: bool,
    chord: bool,
    step: Option<char>,
    alter: i32,
    octave: Option<i32>,
    duration: f64,
    voice: u8,
    staff: u8,
    tied: bool,
}

#[derive(Default)]
struct PartBuilder {
    id: String,
    measures: Vec<Measure>,
    time_signatures: Vec<TimeSignature>,
    key_signatures: Vec<KeySignature>,
    tempos: Vec<TempoMark>,
    divisions: f64,
}

#[derive(Default)]
struct MeasureCursor {
    notes: Vec<ScoreNote>,
    beat: f64,
    last_onset: f64,
}

#[derive(Default)]
struct ScoreParser {
    stack: Vec<String>,
    work_title: Option<String>,
    movement_title: Option<String>,
    composer: Option<String>,
    creator_is_composer: bool,
    score_part_id: Option<String>,
    part_names: HashMap<String, String>,
    parts: Vec<Part>,
    first_part: Option<PartBuilder>,
    part: Option<PartBuilder>,
    measure: Option<MeasureCursor>,
    note: Option<NoteBuilder>,
    skip_duration: f64,
    time: (Option<u8>, Option<u8>),
    key: (Option<i8>, KeyMode),
    direction_tempo: Option<f32>,
    metronome_tempo: Option<f32>,
    seen_root: bool,
}

impl ScoreParser {
    fn parse(mut self, xml: &str) -> Result<ParsedScore, ParseError> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        loop {
            let position = reader.buffer_position();
            let event = reader
                .read_event()
                .map_err(|err| ParseError::markup(position, err))?;
            match event {
                Event::Start(ref e) => self.open(e)?,
                Event::Empty(ref e) => {
                    self.open(e)?;
                    self.close(position)?;
                }
                Event::End(ref e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    if self.stack.last() != Some(&name) {
                        return Err(ParseError::markup(
                            position,
                            format!("unexpected closing tag </{name}>"),
                        ));
                    }
                    self.close(position)?;
                }
                Event::Text(ref e) => {
                    let text = e
                        .unescape()
                        .map_err(|err| ParseError::markup(position, err))?;
                    self.text(text.trim())?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = self.stack.last() {
            return Err(ParseError::markup(
                xml.len(),
                format!("unclosed element <{open}>"),
            ));
        }
        if !self.seen_root {
            return Err(ParseError::markup(0, "document has no root element"));
        }
        Ok(self.finish())
    }

    fn top(&self) -> &str {
        self.stack.last().map(String::as_str).unwrap_or("")
    }

    fn parent(&self) -> &str {
        self.stack
            .len()
            .checked_sub(2)
            .and_then(|i| self.stack.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }

    fn inside(&self, element: &str) -> bool {
        self.stack.iter().any(|name| name == element)
    }

    fn open(&mut self, e: &BytesStart) -> Result<(), ParseError> {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
        if self.stack.is_empty() {
            if self.seen_root {
                return Err(ParseError::markup(0, "multiple root elements"));
            }
            if name != "score-partwise" {
                return Err(ParseError::UnsupportedRoot(name));
            }
            self.seen_root = true;
        }
        match name.as_str() {
            "creator" => self.creator_is_composer = attribute(e, "type")?.as_deref() == Some("composer"),
            "score-part" => self.score_part_id = attribute(e, "id")?,
            "part" => {
                let id = attribute(e, "id")?
                    .unwrap_or_else(|| format!("P{}", self.parts.len() + 1));
                self.part = Some(PartBuilder {
                    id,
                    divisions: 1.0,
                    ..Default::default()
                });
            }
            "measure" if self.part.is_some() => self.measure = Some(MeasureCursor::default()),
            "note" if self.measure.is_some() => {
                self.note = Some(NoteBuilder {
                    voice: 1,
                    staff: 1,
                    ..Default::default()
                })
            }
            "rest" => {
                if let Some(note) = self.note.as_mut() {
                    note.rest = true;
                }
            }
            "chord" => {
                if let Some(note) = self.note.as_mut() {
                    note.chord = true;
                }
            }
            "tie" => {
                if let Some(note) = self.note.as_mut() {
                    if attribute(e, "type")?.as_deref() == Some("stop") {
                        note.tied = true;
                    }
                }
            }
            "backup" | "forward" => self.skip_duration = 0.0,
            "time" => self.time = (None, None),
            "key" => self.key = (None, KeyMode::Major),
            "direction" => {
                self.direction_tempo = None;
                self.metronome_tempo = None;
            }
            "sound" => {
                if let Some(value) = attribute(e, "tempo")? {
                    let bpm = parse_number::<f32>("sound", &value)?;
                    if self.inside("direction") {
                        self.direction_tempo = Some(bpm);
                    } else {
                        self.push_tempo(bpm);
                    }
                }
            }
            _ => {}
        }
        self.stack.push(name);
        Ok(())
    }

    fn close(&mut self, position: usize) -> Result<(), ParseError> {
        let Some(name) = self.stack.pop() else {
            return Err(ParseError::markup(position, "closing tag without opening tag"));
        };
        match name.as_str() {
            "score-part" => self.score_part_id = None,
            "note" => self.finish_note()?,
            "backup" => {
                if let Some(measure) = self.measure.as_mut() {
                    measure.beat = (measure.beat - self.skip_duration).max(0.0);
                }
            }
            "forward" => {
                if let Some(measure) = self.measure.as_mut() {
                    measure.beat += self.skip_duration;
                }
            }
            "time" => {
                if let (Some(beats), Some(beat_type)) = self.time {
                    let measure = self.measure_number();
                    if let Some(part) = self.part.as_mut() {
                        part.time_signatures.push(TimeSignature {
                            beats,
                            beat_type,
                            measure,
                        });
                    }
                }
            }
            "key" => {
                if let (Some(fifths), mode) = self.key {
                    let measure = self.measure_number();
                    if let Some(part) = self.part.as_mut() {
                        part.key_signatures.push(KeySignature {
                            fifths,
                            mode,
                            measure,
                        });
                    }
                }
            }
            "direction" => {
                if let Some(bpm) = self.direction_tempo.or(self.metronome_tempo) {
                    self.push_tempo(bpm);
                }
            }
            "measure" => {
                if let (Some(cursor), Some(part)) = (self.measure.take(), self.part.as_mut()) {
                    let number = part.measures.len() as u32 + 1;
                    part.measures.push(Measure::new(number, cursor.notes));
                }
            }
            "part" => self.finish_part(),
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<(), ParseError> {
        if text.is_empty() {
            return Ok(());
        }
        let top = self.top().to_string();
        let parent = self.parent().to_string();
        match (parent.as_str(), top.as_str()) {
            (_, "work-title") if self.work_title.is_none() => {
                self.work_title = Some(text.to_string());
            }
            (_, "movement-title") if self.movement_title.is_none() => {
                self.movement_title = Some(text.to_string());
            }
            (_, "creator") if self.creator_is_composer && self.composer.is_none() => {
                self.composer = Some(text.to_string());
            }
            ("score-part", "part-name") => {
                if let Some(id) = self.score_part_id.clone() {
                    self.part_names.insert(id, text.to_string());
                }
            }
            ("attributes", "divisions") => {
                let divisions = parse_number::<f64>("divisions", text)?;
                if divisions <= 0.0 {
                    return Err(ParseError::invalid("divisions", text));
                }
                if let Some(part) = self.part.as_mut() {
                    part.divisions = divisions;
                }
            }
            ("time", "beats") => {
                // Composite meters such as "3+2" add up.
                let mut total = 0u8;
                for piece in text.split('+') {
                    total = total.saturating_add(parse_number::<u8>("beats", piece)?);
                }
                self.time.0 = Some(total);
            }
            ("time", "beat-type") => self.time.1 = Some(parse_number::<u8>("beat-type", text)?),
            ("key", "fifths") => self.key.0 = Some(parse_number::<i8>("fifths", text)?),
            ("key", "mode") => {
                if text.eq_ignore_ascii_case("minor") {
                    self.key.1 = KeyMode::Minor;
                }
            }
            ("metronome", "per-minute") => {
                // Free-text markings like "c. 96" are not tempo marks.
                self.metronome_tempo = text.parse::<f32>().ok();
            }
            ("backup", "duration") | ("forward", "duration") => {
                self.skip_duration = parse_number::<f64>("duration", text)? / self.divisions();
            }
            _ => self.note_text(&parent, &top, text)?,
        }
        Ok(())
    }

    fn note_text(&mut self, parent: &str, top: &str, text: &str) -> Result<(), ParseError> {
        let divisions = self.divisions();
        let Some(note) = self.note.as_mut() else {
            return Ok(());
        };
        match (parent, top) {
            ("pitch", "step") => {
                let step = text
                    .chars()
                    .next()
                    .filter(|_| text.len() == 1)
                    .ok_or_else(|| ParseError::invalid("step", text))?;
                note.step = Some(step.to_ascii_uppercase());
            }
            ("pitch", "alter") => note.alter = parse_number::<f64>("alter", text)?.round() as i32,
            ("pitch", "octave") => note.octave = Some(parse_number::<i32>("octave", text)?),
            ("note", "duration") => note.duration = parse_number::<f64>("duration", text)? / divisions,
            ("note", "voice") => note.voice = parse_number::<u8>("voice", text)?,
            ("note", "staff") => note.staff = parse_number::<u8>("staff", text)?,
            _ => {}
        }
        Ok(())
    }

    fn finish_note(&mut self) -> Result<(), ParseError> {
        let (Some(note), Some(measure)) = (self.note.take(), self.measure.as_mut()) else {
            return Ok(());
        };
        let start_beat = if note.chord {
            measure.last_onset
        } else {
            measure.last_onset = measure.beat;
            measure.beat += note.duration;
            measure.last_onset
        };
        if note.rest {
            return Ok(());
        }
        // Unpitched notes occupy time but carry no pitch to grade.
        let (Some(step), Some(octave)) = (note.step, note.octave) else {
            return Ok(());
        };
        measure.notes.push(ScoreNote {
            midi: midi_from_pitch(step, note.alter, octave)?,
            start_beat,
            duration_beats: note.duration,
            voice: note.voice,
            staff: note.staff,
            tied: note.tied,
        });
        Ok(())
    }

    fn push_tempo(&mut self, bpm: f32) {
        let measure = self.measure_number();
        let beat = self.measure.as_ref().map(|m| m.beat).unwrap_or(0.0);
        if let Some(part) = self.part.as_mut() {
            part.tempos.push(TempoMark { bpm, measure, beat });
        }
    }

    fn finish_part(&mut self) {
        let Some(builder) = self.part.take() else {
            return;
        };
        let name = self
            .part_names
            .get(&builder.id)
            .cloned()
            .unwrap_or_else(|| builder.id.clone());
        self.parts.push(Part {
            id: builder.id.clone(),
            name,
            measures: builder.measures.clone(),
        });
        match &self.first_part {
            None => self.first_part = Some(builder),
            Some(first) => {
                if first.time_signatures != builder.time_signatures {
                    debug!(part = %builder.id, "part meter differs from first part; ignoring");
                }
            }
        }
    }

    fn measure_number(&self) -> u32 {
        self.part
            .as_ref()
            .map(|part| part.measures.len() as u32 + 1)
            .unwrap_or(1)
    }

    fn divisions(&self) -> f64 {
        self.part.as_ref().map(|p| p.divisions).unwrap_or(1.0)
    }

    fn finish(self) -> ParsedScore {
        let first = self.first_part.unwrap_or_default();
        ParsedScore {
            title: self
                .work_title
                .or(self.movement_title)
                .unwrap_or_else(|| "Untitled".to_string()),
            composer: self.composer.unwrap_or_default(),
            total_measures: first.measures.len() as u32,
            time_signatures: first.time_signatures,
            key_signatures: first.key_signatures,
            tempos: first.tempos,
            parts: self.parts,
        }
    }
}

fn attribute(e: &BytesStart, key: &str) -> Result<Option<String>, ParseError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ParseError::markup(0, err))?;
        if attr.key.local_name().as_ref() == key.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|err| ParseError::markup(0, err))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn parse_number<T: std::str::FromStr>(element: &str, text: &str) -> Result<T, ParseError> {
    text.trim()
        .parse::<T>()
        .map_err(|_| ParseError::invalid(element, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<score-partwise version="3.1">
  <work><work-title>Etude</work-title></work>
  <identification><creator type="composer">J. Doe</creator></identification>
  <part-list>
    <score-part id="P1"><part-name>Cello</part-name></score-part>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes>
        <divisions>2</divisions>
        <key><fifths>-1</fifths><mode>minor</mode></key>
        <time><beats>3</beats><beat-type>4</beat-type></time>
      </attributes>
      <direction><sound tempo="96"/></direction>
      <note><pitch><step>C</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice></note>
      <note><rest/><duration>2</duration></note>
      <note><pitch><step>B</step><alter>-1</alter><octave>3</octave></pitch><duration>2</duration><tie type="stop"/></note>
    </measure>
    <measure number="2">
      <note><pitch><step>C</step><octave>4</octave></pitch><duration>4</duration></note>
      <note><chord/><pitch><step>E</step><octave>4</octave></pitch><duration>4</duration></note>
      <note><chord/><pitch><step>G</step><octave>4</octave></pitch><duration>4</duration></note>
      <note><pitch><step>D</step><octave>5</octave></pitch><duration>2</duration></note>
    </measure>
  </part>
</score-partwise>"#;

    #[test]
    fn parses_metadata_and_signatures() {
        let score = parse_musicxml(SIMPLE).unwrap();
        assert_eq!(score.title, "Etude");
        assert_eq!(score.composer, "J. Doe");
        assert_eq!(score.parts[0].name, "Cello");
        assert_eq!(score.total_measures, 2);
        assert_eq!(score.time_signatures[0].beats, 3);
        assert_eq!(score.key_signatures[0].fifths, -1);
        assert_eq!(score.key_signatures[0].mode, KeyMode::Minor);
        assert_eq!(score.tempos[0].bpm, 96.0);
        assert_eq!(score.tempos[0].measure, 1);
    }

    #[test]
    fn rests_advance_without_notes() {
        let score = parse_musicxml(SIMPLE).unwrap();
        let notes = &score.parts[0].measures[0].notes;
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].midi, 60);
        assert_eq!(notes[0].start_beat, 0.0);
        assert_eq!(notes[1].midi, 58);
        assert_eq!(notes[1].start_beat, 2.0);
        assert!(notes[1].tied);
    }

    #[test]
    fn chord_members_share_start_beat() {
        let score = parse_musicxml(SIMPLE).unwrap();
        let notes = &score.parts[0].measures[1].notes;
        let starts: Vec<f64> = notes.iter().map(|n| n.start_beat).collect();
        assert_eq!(starts, vec![0.0, 0.0, 0.0, 2.0]);
        assert_eq!(notes[2].midi, 67);
        assert_eq!(notes[3].midi, 74);
    }

    #[test]
    fn backup_rewinds_cursor_for_second_voice() {
        let xml = r#"<score-partwise><part id="P1"><measure>
            <attributes><divisions>1</divisions></attributes>
            <note><pitch><step>E</step><octave>5</octave></pitch><duration>4</duration><voice>1</voice></note>
            <backup><duration>4</duration></backup>
            <note><pitch><step>C</step><octave>3</octave></pitch><duration>2</duration><voice>2</voice><staff>2</staff></note>
            <forward><duration>1</duration></forward>
            <note><pitch><step>G</step><octave>3</octave></pitch><duration>1</duration><voice>2</voice><staff>2</staff></note>
        </measure></part></score-partwise>"#;
        let score = parse_musicxml(xml).unwrap();
        let notes = &score.parts[0].measures[0].notes;
        assert_eq!(notes[1].start_beat, 0.0);
        assert_eq!(notes[1].voice, 2);
        assert_eq!(notes[1].staff, 2);
        assert_eq!(notes[2].start_beat, 3.0);
        assert_eq!(score.title, "Untitled");
        assert_eq!(score.parts[0].name, "P1");
    }

    #[test]
    fn metronome_mark_is_tempo_fallback() {
        let xml = r#"<score-partwise><part id="P1"><measure>
            <direction><direction-type><metronome><beat-unit>quarter</beat-unit><per-minute>72</per-minute></metronome></direction-type></direction>
        </measure></part></score-partwise>"#;
        let score = parse_musicxml(xml).unwrap();
        assert_eq!(score.tempos.len(), 1);
        assert_eq!(score.tempos[0].bpm, 72.0);
    }

    #[test]
    fn only_first_part_is_document_level() {
        let xml = r#"<score-partwise>
            <part-list><score-part id="A"><part-name>Upper</part-name></score-part><score-part id="B"><part-name>Lower</part-name></score-part></part-list>
            <part id="A"><measure><attributes><time><beats>4</beats><beat-type>4</beat-type></time></attributes></measure></part>
            <part id="B"><measure><attributes><time><beats>6</beats><beat-type>8</beat-type></time></attributes></measure><measure/></part>
        </score-partwise>"#;
        let score = parse_musicxml(xml).unwrap();
        assert_eq!(score.parts.len(), 2);
        assert_eq!(score.parts[1].name, "Lower");
        assert_eq!(score.time_signatures.len(), 1);
        assert_eq!(score.time_signatures[0].beats, 4);
        assert_eq!(score.total_measures, 1);
        assert_eq!(score.parts[1].measures.len(), 2);
    }

    #[test]
    fn parsing_is_idempotent() {
        let first = parse_musicxml(SIMPLE).unwrap();
        let second = parse_musicxml(SIMPLE).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unterminated_tag_is_a_parse_error() {
        let truncated = r#"<score-partwise><part id="P1"><measure><note><pitch><step>C</step"#;
        assert!(matches!(
            parse_musicxml(truncated),
            Err(ParseError::Markup { .. })
        ));
        let unclosed = r#"<score-partwise><part id="P1"><measure>"#;
        assert!(matches!(
            parse_musicxml(unclosed),
            Err(ParseError::Markup { .. })
        ));
    }

    #[test]
    fn mismatched_or_empty_documents_fail() {
        assert!(parse_musicxml("<score-partwise><part></measure></score-partwise>").is_err());
        assert!(parse_musicxml("").is_err());
        assert!(matches!(
            parse_musicxml("<score-timewise/>"),
            Err(ParseError::UnsupportedRoot(_))
        ));
    }

    #[test]
    fn bad_values_are_rejected() {
        let xml = r#"<score-partwise><part id="P1"><measure>
            <note><pitch><step>H</step><octave>4</octave></pitch><duration>1</duration></note>
        </measure></part></score-partwise>"#;
        assert!(matches!(
            parse_musicxml(xml),
            Err(ParseError::InvalidValue { .. })
        ));
        assert!(matches!(
            midi_from_pitch('G', 0, 9),
            Err(ParseError::PitchOutOfRange { .. })
        ));
        assert_eq!(midi_from_pitch('A', 0, 4).unwrap(), 69);
        assert_eq!(midi_from_pitch('F', 1, 4).unwrap(), 66);
    }
}
